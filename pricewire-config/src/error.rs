//! Configuration error types.

use thiserror::Error;

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// File contents could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Environment variable error.
    #[error("Environment error: {0}")]
    EnvError(#[from] std::env::VarError),

    /// Settings failed validation; startup must abort.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}
