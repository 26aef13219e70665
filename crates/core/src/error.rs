//! Core error types

use thiserror::Error;

/// Core error type for the Data Agent
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration parsed but cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid TOML for the expected layout
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
