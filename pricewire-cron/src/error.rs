//! Error types for cron scheduling.

use thiserror::Error;

/// Result type for cron operations.
pub type CronResult<T> = Result<T, CronError>;

/// Cron-specific errors.
#[derive(Debug, Error)]
pub enum CronError {
    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidExpression(String),

    /// The expression never fires again
    #[error("Cron expression '{0}' has no upcoming fire time")]
    NoUpcomingFire(String),

    /// Scheduler already running
    #[error("Scheduler already running")]
    SchedulerAlreadyRunning,

    /// Scheduler not running
    #[error("Scheduler not running")]
    SchedulerNotRunning,

    /// Job store error
    #[error("Store error: {0}")]
    Store(#[from] pricewire_queue::QueueError),
}
