//! Receiver board wiring.
//!
//! The Si4707 add-on board ties the chip's reset line, its GPO2/INT
//! interrupt output and two relays to fixed host GPIOs. This module owns
//! those lines: it resets the chip before power-up, parks the relays, and
//! turns falling edges on the interrupt line into messages for the
//! dispatcher.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::hw_trait::{Edge, GpioPin, InterruptPin, PinMode, PinValue, Result};
use crate::tracing::prelude::*;

/// Reset held low this long.
const RESET_HOLD: Duration = Duration::from_millis(200);

/// Wait after releasing reset before the chip accepts commands.
const RESET_RECOVERY: Duration = Duration::from_secs(1);

/// One falling edge on the interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent;

pub struct RadioBoard {
    reset: Box<dyn GpioPin>,
    relays: Vec<Box<dyn GpioPin>>,
    interrupt: Box<dyn InterruptPin>,
}

impl RadioBoard {
    pub fn new(
        reset: Box<dyn GpioPin>,
        relays: Vec<Box<dyn GpioPin>>,
        interrupt: Box<dyn InterruptPin>,
    ) -> Self {
        Self {
            reset,
            relays,
            interrupt,
        }
    }

    /// Drive every relay low.
    pub async fn park_relays(&mut self) -> Result<()> {
        for relay in self.relays.iter_mut() {
            relay.set_mode(PinMode::Output).await?;
            relay.write(PinValue::Low).await?;
        }
        Ok(())
    }

    /// Pulse the chip's reset line and wait for it to come out of reset.
    ///
    /// The chip is powered down afterwards, whatever it was doing before.
    pub async fn momentary_reset(&mut self) -> Result<()> {
        debug!("Resetting the receiver");
        self.reset.set_mode(PinMode::Output).await?;
        self.reset.write(PinValue::Low).await?;
        tokio::time::sleep(RESET_HOLD).await;
        self.reset.write(PinValue::High).await?;
        tokio::time::sleep(RESET_RECOVERY).await;
        Ok(())
    }

    /// Forward every falling edge on the interrupt line to `events`.
    ///
    /// The edge callback runs on the GPIO driver's thread; it only queues.
    pub fn watch_interrupts(&mut self, events: mpsc::UnboundedSender<InterruptEvent>) -> Result<()> {
        self.interrupt.on_edge(
            Edge::Falling,
            Box::new(move || {
                // Receiver gone means we are shutting down.
                let _ = events.send(InterruptEvent);
            }),
        )
    }

    /// Stop edge reporting and park the relays.
    pub async fn release(&mut self) -> Result<()> {
        self.interrupt.clear()?;
        self.park_relays().await
    }
}
