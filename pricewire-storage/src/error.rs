//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Object store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object not found.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Storage backend error.
    #[error("Storage error: {0}")]
    Backend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid object key.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// Network error.
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,
}

impl StorageError {
    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error is retryable. A missing object stays missing;
    /// backend and network trouble may clear up.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::Io(_) | Self::Network(_) | Self::Timeout
        )
    }
}
