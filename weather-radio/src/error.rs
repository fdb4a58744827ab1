//! Crate-wide error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::hw_trait::HwError;
use crate::si4707::RadioError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HwError),

    #[error(transparent)]
    Radio(#[from] RadioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Message bus error: {0}")]
    Bus(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
