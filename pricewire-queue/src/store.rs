//! Redis-backed job store.
//!
//! One JSON document per job plus queue lists, a scheduled set, a
//! processing set (scored by lease deadline) and per-parent continuation
//! lists. Every cross-key transition runs as a Lua script so an observer
//! never sees a job in two places at once.

use crate::error::{is_transient, QueueError, QueueResult};
use crate::job::{Job, JobId, JobState, RecurringSchedule, FAILED_QUEUE};
use chrono::{DateTime, SecondsFormat, Utc};
use pricewire_log::{debug, info};
use rand::Rng;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::time::Duration;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Deployment-wide key prefix; test runs layer a tenant prefix in front
    pub key_prefix: String,

    /// Retention for succeeded job documents
    pub retention: Duration,

    /// Attempt budget for transient backend errors
    pub op_retries: u32,
}

impl StoreConfig {
    /// Create a new store configuration.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            key_prefix: "pricewire".to_string(),
            retention: Duration::from_secs(86400), // 24 hours
            op_retries: 3,
        }
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the retention for succeeded job documents.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Build a key under the deployment prefix.
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }

    fn job_prefix(&self) -> String {
        self.key("job:")
    }

    fn queue_prefix(&self) -> String {
        self.key("queue:")
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}{}", self.queue_prefix(), queue)
    }

    fn scheduled_key(&self) -> String {
        self.key("scheduled")
    }

    fn processing_key(&self) -> String {
        self.key("processing")
    }

    fn continuations_prefix(&self) -> String {
        self.key("continuations:")
    }

    fn continuations_key(&self, id: &JobId) -> String {
        format!("{}{}", self.continuations_prefix(), id)
    }

    fn lock_key(&self, name: &str) -> String {
        self.key(&format!("lock:{}", name))
    }

    fn recurring_key(&self) -> String {
        self.key("recurring")
    }

    fn recurring_due_key(&self) -> String {
        self.key("recurring:due")
    }
}

/// Outcome of a [`JobStore::fail`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Rescheduled for another attempt
    Retried,
    /// Retries exhausted (or non-retryable): routed to the failed queue
    Discarded,
}

struct Scripts {
    fetch: Script,
    complete: Script,
    fail: Script,
    heartbeat: Script,
    release: Script,
    promote_due: Script,
    reenqueue_orphaned: Script,
    enqueue_continuation: Script,
    unlock: Script,
    reschedule_recurring: Script,
}

impl Scripts {
    fn load() -> Self {
        Self {
            fetch: Script::new(include_str!("../lua/fetch_job.lua")),
            complete: Script::new(include_str!("../lua/complete_job.lua")),
            fail: Script::new(include_str!("../lua/fail_job.lua")),
            heartbeat: Script::new(include_str!("../lua/heartbeat.lua")),
            release: Script::new(include_str!("../lua/release_job.lua")),
            promote_due: Script::new(include_str!("../lua/promote_due.lua")),
            reenqueue_orphaned: Script::new(include_str!("../lua/reenqueue_orphaned.lua")),
            enqueue_continuation: Script::new(include_str!("../lua/enqueue_continuation.lua")),
            unlock: Script::new(include_str!("../lua/unlock.lua")),
            reschedule_recurring: Script::new(include_str!("../lua/reschedule_recurring.lua")),
        }
    }
}

/// Durable job store shared by every worker and scheduler instance.
#[derive(Clone)]
pub struct JobStore {
    connection: ConnectionManager,
    config: StoreConfig,
    scripts: std::sync::Arc<Scripts>,
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl JobStore {
    /// Connect to the backing store.
    pub async fn connect(config: StoreConfig) -> QueueResult<Self> {
        info!("Connecting job store (prefix: {})", config.key_prefix);

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::Config(e.to_string()))?;
        let connection = ConnectionManager::new(client).await?;

        info!("Job store ready");
        Ok(Self {
            connection,
            config,
            scripts: std::sync::Arc::new(Scripts::load()),
        })
    }

    /// The configured key prefix.
    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }

    /// Liveness check against the backend.
    pub async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Retry transient backend errors with jittered backoff.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> QueueResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    attempt += 1;
                    if attempt >= self.config.op_retries {
                        return Err(QueueError::BackendExhausted {
                            attempts: attempt,
                            message: e.to_string(),
                        });
                    }
                    let base = 50u64 * 2u64.pow(attempt.min(5));
                    let jitter = rand::thread_rng().gen_range(0..=base);
                    debug!(
                        "Transient backend error (attempt {}): {}; retrying in {}ms",
                        attempt,
                        e,
                        base + jitter
                    );
                    tokio::time::sleep(Duration::from_millis(base + jitter)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn encode(job: &Job) -> QueueResult<String> {
        serde_json::to_string(job).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    fn decode(raw: &str) -> QueueResult<Job> {
        serde_json::from_str(raw).map_err(|e| QueueError::Deserialization(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Inserts
    // ------------------------------------------------------------------

    /// Insert a job as `Enqueued`, appended to its queue.
    pub async fn enqueue(&self, mut job: Job) -> QueueResult<JobId> {
        let now = Utc::now();
        job.state = JobState::Enqueued;
        job.enqueued_at = Some(now);

        let id = job.id;
        let raw = Self::encode(&job)?;
        let job_key = self.config.job_key(&id);
        let queue_key = self.config.queue_key(&job.queue);

        debug!("Enqueueing job {} ({}) on '{}'", id, job.handler, job.queue);

        self.with_retry(|| {
            let mut conn = self.connection.clone();
            let raw = raw.clone();
            let job_key = job_key.clone();
            let queue_key = queue_key.clone();
            async move {
                redis::pipe()
                    .atomic()
                    .set(&job_key, &raw)
                    .ignore()
                    .rpush(&queue_key, id.to_string())
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await?;

        Ok(id)
    }

    /// Insert a job as `Scheduled`, due at `at`.
    pub async fn schedule(&self, mut job: Job, at: DateTime<Utc>) -> QueueResult<JobId> {
        job.state = JobState::Scheduled;
        job.next_attempt_at = Some(at);

        let id = job.id;
        let raw = Self::encode(&job)?;
        let job_key = self.config.job_key(&id);
        let scheduled_key = self.config.scheduled_key();
        let score = at.timestamp_millis();

        debug!("Scheduling job {} ({}) for {}", id, job.handler, at);

        self.with_retry(|| {
            let mut conn = self.connection.clone();
            let raw = raw.clone();
            let job_key = job_key.clone();
            let scheduled_key = scheduled_key.clone();
            async move {
                redis::pipe()
                    .atomic()
                    .set(&job_key, &raw)
                    .ignore()
                    .zadd(&scheduled_key, id.to_string(), score)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await?;

        Ok(id)
    }

    /// Insert a job gated on `parent_id` reaching `Succeeded`.
    ///
    /// If the parent already succeeded the child is enqueued immediately;
    /// if the parent already failed the child fails with it.
    pub async fn enqueue_continuation(&self, parent_id: JobId, mut job: Job) -> QueueResult<JobId> {
        job.state = JobState::AwaitingContinuation;
        job.parent_id = Some(parent_id);

        let id = job.id;
        let raw = Self::encode(&job)?;
        let now = rfc3339(Utc::now());

        let landed: String = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.enqueue_continuation.prepare_invoke();
                invocation
                    .key(self.config.job_key(&parent_id))
                    .key(self.config.continuations_key(&parent_id))
                    .key(self.config.job_key(&id))
                    .key(self.config.queue_key(&job.queue))
                    .key(self.config.queue_key(FAILED_QUEUE))
                    .arg(raw.clone())
                    .arg(id.to_string())
                    .arg(now.clone());
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        debug!(
            "Continuation {} after {} landed as {}",
            id, parent_id, landed
        );
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Lease lifecycle
    // ------------------------------------------------------------------

    /// Atomically pop one ready job from the named queues and lease it.
    pub async fn fetch(
        &self,
        queues: &[String],
        worker_token: &str,
        lease_ttl: Duration,
    ) -> QueueResult<Option<Job>> {
        let now = Utc::now();
        let deadline = (now + chrono::Duration::from_std(lease_ttl).unwrap_or_default())
            .timestamp_millis();

        for queue in queues {
            let raw: Option<String> = self
                .with_retry(|| {
                    let mut conn = self.connection.clone();
                    let mut invocation = self.scripts.fetch.prepare_invoke();
                    invocation
                        .key(self.config.queue_key(queue))
                        .key(self.config.processing_key())
                        .arg(self.config.job_prefix())
                        .arg(worker_token)
                        .arg(rfc3339(now))
                        .arg(deadline);
                    async move { invocation.invoke_async(&mut conn).await }
                })
                .await?;

            if let Some(raw) = raw {
                return Self::decode(&raw).map(Some);
            }
        }

        Ok(None)
    }

    /// Owner-guarded success transition; promotes continuations.
    pub async fn complete(&self, id: JobId, worker_token: &str) -> QueueResult<()> {
        let outcome: i64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.complete.prepare_invoke();
                invocation
                    .key(self.config.job_key(&id))
                    .key(self.config.processing_key())
                    .key(self.config.continuations_key(&id))
                    .arg(worker_token)
                    .arg(rfc3339(Utc::now()))
                    .arg(self.config.job_prefix())
                    .arg(self.config.queue_prefix())
                    .arg(self.config.retention.as_secs());
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        match outcome {
            1 => Ok(()),
            -1 => Err(QueueError::LeaseLost(id.to_string())),
            _ => Err(QueueError::JobNotFound(id.to_string())),
        }
    }

    /// Owner-guarded failure transition.
    ///
    /// With `retry_at` set and budget remaining the job is rescheduled;
    /// otherwise it is routed to the failed queue together with every
    /// descendant awaiting the chain.
    pub async fn fail(
        &self,
        id: JobId,
        worker_token: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<FailOutcome> {
        let now = Utc::now();
        let retry = retry_at.unwrap_or(now);

        let outcome: i64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.fail.prepare_invoke();
                invocation
                    .key(self.config.job_key(&id))
                    .key(self.config.processing_key())
                    .key(self.config.scheduled_key())
                    .key(self.config.queue_key(FAILED_QUEUE))
                    .arg(worker_token)
                    .arg(rfc3339(now))
                    .arg(error)
                    .arg(if retry_at.is_some() { "1" } else { "0" })
                    .arg(rfc3339(retry))
                    .arg(retry.timestamp_millis())
                    .arg(self.config.job_prefix())
                    .arg(self.config.continuations_prefix());
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        match outcome {
            1 => Ok(FailOutcome::Retried),
            2 => Ok(FailOutcome::Discarded),
            -1 => Err(QueueError::LeaseLost(id.to_string())),
            _ => Err(QueueError::JobNotFound(id.to_string())),
        }
    }

    /// Owner-guarded lease extension.
    pub async fn heartbeat(
        &self,
        id: JobId,
        worker_token: &str,
        lease_ttl: Duration,
    ) -> QueueResult<()> {
        let deadline = (Utc::now() + chrono::Duration::from_std(lease_ttl).unwrap_or_default())
            .timestamp_millis();

        let outcome: i64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.heartbeat.prepare_invoke();
                invocation
                    .key(self.config.job_key(&id))
                    .key(self.config.processing_key())
                    .arg(worker_token)
                    .arg(deadline);
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        match outcome {
            1 => Ok(()),
            -1 => Err(QueueError::LeaseLost(id.to_string())),
            _ => Err(QueueError::JobNotFound(id.to_string())),
        }
    }

    /// Push a leased job back without consuming a retry (the worker could
    /// not take the job's concurrency lock).
    pub async fn release(&self, id: JobId, worker_token: &str, delay: Duration) -> QueueResult<()> {
        let retry = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();

        let outcome: i64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.release.prepare_invoke();
                invocation
                    .key(self.config.job_key(&id))
                    .key(self.config.processing_key())
                    .key(self.config.scheduled_key())
                    .arg(worker_token)
                    .arg(rfc3339(retry))
                    .arg(retry.timestamp_millis());
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        match outcome {
            1 => Ok(()),
            -1 => Err(QueueError::LeaseLost(id.to_string())),
            _ => Err(QueueError::JobNotFound(id.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Move due `Scheduled` jobs into their queues. Returns the count.
    pub async fn promote_due(&self, limit: usize) -> QueueResult<u64> {
        let now = Utc::now();
        let promoted: u64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.promote_due.prepare_invoke();
                invocation
                    .key(self.config.scheduled_key())
                    .arg(now.timestamp_millis())
                    .arg(limit)
                    .arg(self.config.job_prefix())
                    .arg(self.config.queue_prefix())
                    .arg(rfc3339(now));
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        if promoted > 0 {
            debug!("Promoted {} scheduled jobs", promoted);
        }
        Ok(promoted)
    }

    /// Revert lease-expired jobs to `Enqueued`; the interrupted attempt is
    /// voided. Returns the count.
    pub async fn reenqueue_orphaned(&self) -> QueueResult<u64> {
        let now = Utc::now();
        let recovered: u64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.reenqueue_orphaned.prepare_invoke();
                invocation
                    .key(self.config.processing_key())
                    .arg(now.timestamp_millis())
                    .arg(self.config.job_prefix())
                    .arg(self.config.queue_prefix())
                    .arg(rfc3339(now));
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        if recovered > 0 {
            info!("Recovered {} orphaned jobs", recovered);
        }
        Ok(recovered)
    }

    /// Remove terminal jobs older than the cutoff from the failed queue.
    /// Succeeded documents age out via their retention TTL.
    pub async fn purge(&self, older_than: Duration) -> QueueResult<u64> {
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();
        let failed_key = self.config.queue_key(FAILED_QUEUE);

        let mut conn = self.connection.clone();
        let ids: Vec<String> = conn.lrange(&failed_key, 0, -1).await?;

        let mut purged = 0u64;
        for id in ids {
            let job_key = self.config.key(&format!("job:{}", id));
            let raw: Option<String> = conn.get(&job_key).await?;

            let expired = match raw {
                Some(raw) => match Self::decode(&raw) {
                    Ok(job) => job.finished_at.map(|t| t < cutoff).unwrap_or(false),
                    // Unreadable document: count it as garbage.
                    Err(_) => true,
                },
                None => true,
            };

            if expired {
                redis::pipe()
                    .atomic()
                    .lrem(&failed_key, 0, &id)
                    .ignore()
                    .del(&job_key)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await?;
                purged += 1;
            }
        }

        if purged > 0 {
            info!("Purged {} terminal jobs", purged);
        }
        Ok(purged)
    }

    // ------------------------------------------------------------------
    // Named locks
    // ------------------------------------------------------------------

    /// Try to take a named lock for `ttl`. Returns whether it was acquired.
    pub async fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> QueueResult<bool> {
        let key = self.config.lock_key(name);
        let acquired: Option<String> = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let key = key.clone();
                let token = token.to_string();
                let ttl_ms = ttl.as_millis() as u64;
                async move {
                    redis::cmd("SET")
                        .arg(&key)
                        .arg(&token)
                        .arg("NX")
                        .arg("PX")
                        .arg(ttl_ms)
                        .query_async(&mut conn)
                        .await
                }
            })
            .await?;

        Ok(acquired.is_some())
    }

    /// Release a named lock if still held under `token`.
    pub async fn unlock(&self, name: &str, token: &str) -> QueueResult<()> {
        let _: i64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.unlock.prepare_invoke();
                invocation.key(self.config.lock_key(name)).arg(token);
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recurring schedules
    // ------------------------------------------------------------------

    /// Insert or replace a recurring schedule.
    pub async fn upsert_recurring(&self, schedule: &RecurringSchedule) -> QueueResult<()> {
        let raw = serde_json::to_string(schedule)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        let score = schedule.next_fire_at.timestamp_millis();

        self.with_retry(|| {
            let mut conn = self.connection.clone();
            let hash = self.config.recurring_key();
            let due = self.config.recurring_due_key();
            let name = schedule.name.clone();
            let raw = raw.clone();
            async move {
                redis::pipe()
                    .atomic()
                    .hset(&hash, &name, &raw)
                    .ignore()
                    .zadd(&due, &name, score)
                    .ignore()
                    .query_async::<()>(&mut conn)
                    .await
            }
        })
        .await?;

        info!(
            "Recurring schedule '{}' -> {} (next fire {})",
            schedule.name, schedule.cron_expr, schedule.next_fire_at
        );
        Ok(())
    }

    /// Recurring schedules due at `now`, ordered by fire time then name.
    pub async fn due_recurring(&self, now: DateTime<Utc>) -> QueueResult<Vec<RecurringSchedule>> {
        let mut conn = self.connection.clone();
        let names: Vec<String> = conn
            .zrangebyscore(
                self.config.recurring_due_key(),
                "-inf",
                now.timestamp_millis(),
            )
            .await?;

        let mut due = Vec::with_capacity(names.len());
        for name in names {
            let raw: Option<String> = conn.hget(self.config.recurring_key(), &name).await?;
            if let Some(raw) = raw {
                let schedule: RecurringSchedule = serde_json::from_str(&raw)
                    .map_err(|e| QueueError::Deserialization(e.to_string()))?;
                due.push(schedule);
            }
        }
        Ok(due)
    }

    /// Advance a schedule's fire bookkeeping with compare-and-set on the
    /// expected next fire time. Returns `false` when another scheduler won.
    pub async fn reschedule_recurring(
        &self,
        name: &str,
        fired_at: DateTime<Utc>,
        next_fire_at: DateTime<Utc>,
        expected_next: DateTime<Utc>,
    ) -> QueueResult<bool> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.hget(self.config.recurring_key(), name).await?;
        let Some(raw) = raw else {
            return Err(QueueError::ScheduleNotFound(name.to_string()));
        };

        let mut schedule: RecurringSchedule =
            serde_json::from_str(&raw).map_err(|e| QueueError::Deserialization(e.to_string()))?;
        schedule.last_fire_at = Some(fired_at);
        schedule.next_fire_at = next_fire_at;
        let updated = serde_json::to_string(&schedule)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let outcome: i64 = self
            .with_retry(|| {
                let mut conn = self.connection.clone();
                let mut invocation = self.scripts.reschedule_recurring.prepare_invoke();
                invocation
                    .key(self.config.recurring_key())
                    .key(self.config.recurring_due_key())
                    .arg(name)
                    .arg(expected_next.timestamp_millis())
                    .arg(updated.clone())
                    .arg(next_fire_at.timestamp_millis());
                async move { invocation.invoke_async(&mut conn).await }
            })
            .await?;

        Ok(outcome == 1)
    }

    /// Remove a recurring schedule.
    pub async fn remove_recurring(&self, name: &str) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        redis::pipe()
            .atomic()
            .hdel(self.config.recurring_key(), name)
            .ignore()
            .zrem(self.config.recurring_due_key(), name)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Load a job document.
    pub async fn get_job(&self, id: JobId) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(self.config.job_key(&id)).await?;
        raw.map(|r| Self::decode(&r)).transpose()
    }

    /// Number of ready jobs in a queue.
    pub async fn queue_len(&self, queue: &str) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let len: usize = conn.llen(self.config.queue_key(queue)).await?;
        Ok(len)
    }

    /// Number of leased jobs.
    pub async fn processing_len(&self) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let len: usize = conn.zcard(self.config.processing_key()).await?;
        Ok(len)
    }

    /// Drop every key under the configured prefix. Test isolation only.
    pub async fn clear(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let pattern = format!("{}:*", self.config.key_prefix);
        let keys: Vec<String> = conn.keys(&pattern).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = StoreConfig::new("redis://localhost:6379");
        assert_eq!(config.key_prefix, "pricewire");
        assert_eq!(config.retention, Duration::from_secs(86400));
        assert_eq!(config.op_retries, 3);
    }

    #[test]
    fn test_key_layout() {
        let config = StoreConfig::new("redis://localhost:6379").with_key_prefix("test-1");
        let id = uuid::Uuid::now_v7();

        assert_eq!(config.job_key(&id), format!("test-1:job:{}", id));
        assert_eq!(config.queue_key("default"), "test-1:queue:default");
        assert_eq!(config.scheduled_key(), "test-1:scheduled");
        assert_eq!(config.processing_key(), "test-1:processing");
        assert_eq!(config.lock_key("email-poll"), "test-1:lock:email-poll");
        assert_eq!(config.recurring_key(), "test-1:recurring");
    }

    #[test]
    fn test_prefixes_are_disjoint_per_deployment() {
        let a = StoreConfig::new("redis://localhost:6379").with_key_prefix("prod");
        let b = StoreConfig::new("redis://localhost:6379").with_key_prefix("staging");
        assert_ne!(a.queue_key("default"), b.queue_key("default"));
    }

    #[test]
    fn test_rfc3339_roundtrip() {
        let now = Utc::now();
        let s = rfc3339(now);
        let back: DateTime<Utc> = s.parse().unwrap();
        // Micros precision on the wire
        assert_eq!(back.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_scripts_parse() {
        // Loading computes each script's SHA; a malformed bundle fails here.
        let scripts = Scripts::load();
        assert!(!scripts.fetch.get_hash().is_empty());
        assert!(!scripts.complete.get_hash().is_empty());
        assert!(!scripts.fail.get_hash().is_empty());
        assert!(!scripts.reschedule_recurring.get_hash().is_empty());
    }
}
