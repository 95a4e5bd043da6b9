//! Error types for job store and worker operations.

use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The caller no longer holds the lease on the job
    #[error("Lease lost on job {0}")]
    LeaseLost(String),

    /// Recurring schedule not found
    #[error("Recurring schedule not found: {0}")]
    ScheduleNotFound(String),

    /// No handler registered for job type
    #[error("No handler registered for job type: {0}")]
    NoHandler(String),

    /// Worker not running
    #[error("Worker not running")]
    WorkerNotRunning,

    /// Worker already running
    #[error("Worker already running")]
    WorkerAlreadyRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Backend still failing after the internal retry budget
    #[error("Backend unavailable after {attempts} attempts: {message}")]
    BackendExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message.
        message: String,
    },

    /// Generic error
    #[error("Queue error: {0}")]
    Other(String),
}

impl QueueError {
    /// Whether the operation may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Redis(e) => is_transient(e),
            Self::BackendExhausted { .. } => true,
            _ => false,
        }
    }
}

/// Transient backend errors: connection drops, timeouts, cluster moves.
pub(crate) fn is_transient(err: &redis::RedisError) -> bool {
    err.is_io_error() || err.is_timeout() || err.is_connection_dropped() || err.is_cluster_error()
}
