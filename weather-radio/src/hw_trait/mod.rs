//! Hardware abstraction layer traits.
//!
//! This module defines the interfaces the receiver driver needs from the
//! host: a raw I2C bus, the SMBus-style register primitives layered on top of
//! it, and GPIO lines (reset, relays, interrupt). Implementations live in
//! [`crate::transport`], either on real hardware or a simulated chip.

pub mod gpio;
pub mod i2c;

// Re-export traits
pub use gpio::{Edge, GpioPin, InterruptPin, PinMode, PinValue};
pub use i2c::{Endian, I2c, I2cError, Smbus, SmbusDevice};

/// Common error type for hardware operations
#[derive(Debug, thiserror::Error)]
pub enum HwError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I2C bus level failure
    #[error(transparent)]
    I2c(#[from] I2cError),

    /// Invalid parameter or argument
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Operation not supported by hardware
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Timeout waiting for hardware response
    #[error("Hardware timeout")]
    Timeout,

    /// Other hardware-specific error
    #[error("Hardware error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HwError>;
