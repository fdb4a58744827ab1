//! GPIO hardware abstraction trait.

use async_trait::async_trait;
use super::Result;

/// GPIO pin value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinValue {
    Low,
    High,
}

impl From<bool> for PinValue {
    fn from(value: bool) -> Self {
        if value { PinValue::High } else { PinValue::Low }
    }
}

impl From<PinValue> for bool {
    fn from(value: PinValue) -> Self {
        matches!(value, PinValue::High)
    }
}

/// GPIO pin mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// GPIO pin abstraction
#[async_trait]
pub trait GpioPin: Send {
    /// Set the pin mode (input or output).
    async fn set_mode(&mut self, mode: PinMode) -> Result<()>;

    /// Write a value to the pin (must be in output mode).
    async fn write(&mut self, value: PinValue) -> Result<()>;

    /// Read the current value of the pin.
    async fn read(&mut self) -> Result<PinValue>;
}

/// Signal edge that fires an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

/// Callback run by an interrupt source on every matching edge.
///
/// It runs on whatever thread the GPIO driver owns, never on the async
/// runtime, so it must only hand the event off.
pub type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

/// An input line that can report edges asynchronously.
pub trait InterruptPin: Send {
    /// Start invoking `callback` on every `edge`. Replaces any previous
    /// registration.
    fn on_edge(&mut self, edge: Edge, callback: EdgeCallback) -> Result<()>;

    /// Stop edge reporting.
    fn clear(&mut self) -> Result<()>;
}
