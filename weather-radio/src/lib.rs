//! Driver and daemon for an Si4707 NOAA weather-band receiver.
//!
//! The receiver sits on I2C with a reset line, an interrupt line and two
//! relays wired to host GPIOs. The daemon powers it up, listens for SAME
//! alert messages and alert tones, polls signal quality and publishes all
//! of it as plain key/value telemetry.

pub mod board;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod error;
pub mod hw_trait;
pub mod si4707;
pub mod telemetry;
pub mod tracing;
pub mod transport;
