//! Error types for Si4707 operations

use thiserror::Error;

use crate::hw_trait::HwError;

/// A response that does not fit the layout of its command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{command} response too short: need {need} bytes, have {have}")]
    ShortResponse {
        command: &'static str,
        need: usize,
        have: usize,
    },
}

/// What a requester of a chip operation receives on failure.
#[derive(Error, Debug)]
pub enum RadioError {
    /// The bus transaction itself failed.
    #[error("bus transfer failed: {0}")]
    Transport(#[from] HwError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Data operations need the chip powered up first.
    #[error("chip is not powered up")]
    NotPowered,

    /// The session worker has stopped; nothing will reach the bus.
    #[error("chip session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, RadioError>;
