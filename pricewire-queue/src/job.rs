//! Job record and state management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job unique identifier.
///
/// UUIDv7: time-ordered, so ids sort roughly by creation time.
pub type JobId = Uuid;

/// Job state.
///
/// Transitions out of `Processing` go only to `Succeeded`, `Scheduled`
/// (retry) or `Failed` (retries exhausted). A lease that lapses reverts the
/// job to `Enqueued` without consuming a retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Ready in its queue, waiting for a worker
    Enqueued,
    /// Waiting for `next_attempt_at` (delayed insert or retry backoff)
    Scheduled,
    /// A worker holds the lease and is running the handler
    Processing,
    /// Terminal success
    Succeeded,
    /// Terminal failure (routed to the `failed` queue)
    Failed,
    /// Gated on the parent job reaching `Succeeded`
    AwaitingContinuation,
}

impl JobState {
    /// Terminal states are never fetched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// The default queue jobs are enqueued to.
pub const DEFAULT_QUEUE: &str = "default";

/// Queue that terminally failed jobs are routed to.
pub const FAILED_QUEUE: &str = "failed";

/// A unit of work held in the job store.
///
/// Serialized as a single JSON document per job; the store's Lua scripts
/// decode, mutate and re-encode it so every state transition is atomic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,

    /// Logical lane the job waits in
    pub queue: String,

    /// Registered handler name
    pub handler: String,

    /// Serialized handler arguments
    pub payload: serde_json::Value,

    /// Current state
    pub state: JobState,

    /// Number of attempts started and not voided
    pub attempts: u32,

    /// Attempt budget; at `attempts == max_attempts` a failure is terminal
    pub max_attempts: u32,

    /// Named lock that must be held while the job is `Processing`
    pub concurrency_key: Option<String>,

    /// If set, the job runs only after the parent reaches `Succeeded`
    pub parent_id: Option<JobId>,

    /// Lease identifier of the worker currently running the job
    pub owner_token: Option<String>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the job last became ready
    pub enqueued_at: Option<DateTime<Utc>>,

    /// When the current (or last) attempt started
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Populated only in `Scheduled`
    pub next_attempt_at: Option<DateTime<Utc>>,

    /// Message captured from the most recent failure
    pub last_error: Option<String>,
}

impl Job {
    /// Create a new job for a handler.
    pub fn new(handler: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            queue: DEFAULT_QUEUE.to_string(),
            handler: handler.into(),
            payload,
            state: JobState::Enqueued,
            attempts: 0,
            max_attempts: 4,
            concurrency_key: None,
            parent_id: None,
            owner_token: None,
            created_at: Utc::now(),
            enqueued_at: None,
            started_at: None,
            finished_at: None,
            next_attempt_at: None,
            last_error: None,
        }
    }

    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the concurrency key.
    pub fn with_concurrency_key(mut self, key: impl Into<String>) -> Self {
        self.concurrency_key = Some(key.into());
        self
    }

    /// Whether another attempt is allowed after a failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A cron-driven specification that repeatedly enqueues a fresh job.
///
/// Unique by `name`; upserting replaces the entry cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSchedule {
    /// Unique schedule name
    pub name: String,

    /// Cron expression (5- or 6-field; seconds optional)
    pub cron_expr: String,

    /// Handler name for the jobs this schedule produces
    pub handler: String,

    /// Payload cloned into every fired job
    pub payload: serde_json::Value,

    /// Queue fired jobs are enqueued to
    pub queue: String,

    /// Last time the schedule fired
    pub last_fire_at: Option<DateTime<Utc>>,

    /// Next time the schedule is due
    pub next_fire_at: DateTime<Utc>,
}

impl RecurringSchedule {
    /// Create a schedule firing `handler` with an empty payload.
    pub fn new(
        name: impl Into<String>,
        cron_expr: impl Into<String>,
        handler: impl Into<String>,
        next_fire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            cron_expr: cron_expr.into(),
            handler: handler.into(),
            payload: serde_json::Value::Null,
            queue: DEFAULT_QUEUE.to_string(),
            last_fire_at: None,
            next_fire_at,
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_creation() {
        let job = Job::new("email-poll", serde_json::json!({}));

        assert_eq!(job.queue, DEFAULT_QUEUE);
        assert_eq!(job.handler, "email-poll");
        assert_eq!(job.state, JobState::Enqueued);
        assert_eq!(job.attempts, 0);
        assert!(job.owner_token.is_none());
    }

    #[test]
    fn test_job_builder() {
        let job = Job::new("csv-split", serde_json::json!({"objectKey": "k"}))
            .with_queue("imports")
            .with_max_attempts(6)
            .with_concurrency_key("csv-split:k");

        assert_eq!(job.queue, "imports");
        assert_eq!(job.max_attempts, 6);
        assert_eq!(job.concurrency_key.as_deref(), Some("csv-split:k"));
    }

    #[test]
    fn test_job_retry_budget() {
        let mut job = Job::new("t", serde_json::json!({})).with_max_attempts(2);
        assert!(job.can_retry());

        job.attempts = 1;
        assert!(job.can_retry());

        job.attempts = 2;
        assert!(!job.can_retry());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = Job::new("t", serde_json::json!({}));
        let b = Job::new("t", serde_json::json!({}));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Enqueued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(!JobState::AwaitingContinuation.is_terminal());
    }

    #[test]
    fn test_job_roundtrip_serde() {
        let job = Job::new("batch-dispatch", serde_json::json!({"batchNumber": 2}))
            .with_concurrency_key("email:abc");

        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, job.id);
        assert_eq!(back.state, JobState::Enqueued);
        assert_eq!(back.concurrency_key, job.concurrency_key);
        assert_eq!(back.payload, job.payload);
    }

    #[test]
    fn test_recurring_schedule() {
        let next = Utc::now();
        let sched = RecurringSchedule::new("email-processing", "*/5 * * * *", "email-poll", next);

        assert_eq!(sched.name, "email-processing");
        assert_eq!(sched.queue, DEFAULT_QUEUE);
        assert!(sched.last_fire_at.is_none());
        assert_eq!(sched.next_fire_at, next);
    }
}
