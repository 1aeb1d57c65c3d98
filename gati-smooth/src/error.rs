//! Error types for the smoother.

use thiserror::Error;

/// Smoother error type.
#[derive(Error, Debug)]
pub enum SmoothError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input trajectory error: {0}")]
    Input(String),

    #[error("Failed to time-parameterize the initial path: {0}")]
    InitialPath(String),

    #[error("Emitted trajectory violates constraints: {0}")]
    Emission(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for SmoothError {
    fn from(e: toml::de::Error) -> Self {
        SmoothError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SmoothError>;
