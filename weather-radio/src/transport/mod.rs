//! Host-side implementations of the [`crate::hw_trait`] interfaces.
//!
//! [`sim`] models the receiver chip in memory and backs both the test suite
//! and `WXRADIO_SIMULATE` runs. [`rpi`] drives a real board through the
//! Raspberry Pi's I2C controller and GPIO header (feature `rpi`).

#[cfg(feature = "rpi")]
pub mod rpi;
pub mod sim;

pub use sim::{SimInterruptPin, SimPin, SimulatedChip};
