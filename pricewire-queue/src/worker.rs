//! Worker runtime: fetches leased jobs and drives registered handlers.

use crate::error::{QueueError, QueueResult};
use crate::job::{Job, DEFAULT_QUEUE};
use crate::store::{FailOutcome, JobStore};
use chrono::{DateTime, Utc};
use pricewire_log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Error returned by a job handler.
///
/// The worker translates `retryable` into the store-level failure mode:
/// retryable errors consume one attempt and reschedule per the handler's
/// retry delays; fatal errors route the job to the failed queue at once.
#[derive(Debug, Clone)]
pub struct HandlerError {
    /// Human-readable failure description, written into the job record
    pub message: String,
    /// Whether another attempt may succeed
    pub retryable: bool,
}

impl HandlerError {
    /// A failure whose retryability the underlying error decides (its
    /// `is_retryable()`).
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }

    /// A failure worth retrying (integration errors, timeouts).
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(message, true)
    }

    /// A failure that will not improve with retries (validation errors).
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(message, false)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Result type returned by job handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Boxed async job handler.
pub type JobHandler =
    Arc<dyn Fn(JobContext) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// Per-handler execution metadata.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Queue the handler's jobs are fetched from
    pub queue: String,

    /// Backoff ladder; attempt k (1-based) that fails is retried after
    /// `retry_delays[k-1]` (the last entry repeats). Empty disables retries.
    pub retry_delays: Vec<Duration>,

    /// TTL of the named lock taken for the job's `concurrency_key`
    pub exclusion_window: Duration,

    /// Lock taken for jobs that carry no `concurrency_key` of their own
    /// (e.g. a fixed per-handler lock like `email-poll`)
    pub default_concurrency_key: Option<String>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            retry_delays: vec![
                Duration::from_secs(300),
                Duration::from_secs(600),
                Duration::from_secs(900),
            ],
            exclusion_window: Duration::from_secs(300),
            default_concurrency_key: None,
        }
    }
}

impl HandlerOptions {
    /// Set the retry delays.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Set the exclusion window for concurrency keys.
    pub fn with_exclusion_window(mut self, window: Duration) -> Self {
        self.exclusion_window = window;
        self
    }

    /// Set the lock used when a job has no concurrency key of its own.
    pub fn with_default_concurrency_key(mut self, key: impl Into<String>) -> Self {
        self.default_concurrency_key = Some(key.into());
        self
    }

    /// Attempt budget implied by the retry ladder: first run plus retries.
    pub fn max_attempts(&self) -> u32 {
        self.retry_delays.len() as u32 + 1
    }

    fn retry_at(&self, attempt: u32) -> Option<DateTime<Utc>> {
        if self.retry_delays.is_empty() {
            return None;
        }
        let idx = (attempt.saturating_sub(1) as usize).min(self.retry_delays.len() - 1);
        let delay = chrono::Duration::from_std(self.retry_delays[idx]).unwrap_or_default();
        Some(Utc::now() + delay)
    }
}

/// Invocation context handed to a handler.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Snapshot of the job record at fetch time
    pub job: Job,

    /// Hard deadline for this attempt (lease TTL minus a safety margin);
    /// handlers must propagate it to outbound calls
    pub deadline: DateTime<Utc>,
}

impl JobContext {
    /// Deserialize the job payload.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.job.payload.clone())
            .map_err(|e| HandlerError::fatal(format!("malformed payload: {}", e)))
    }

    /// The 1-based attempt number of this invocation.
    pub fn attempt(&self) -> u32 {
        self.job.attempts
    }

    /// Time remaining until the attempt deadline.
    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or_default()
    }
}

struct Registration {
    handler: JobHandler,
    options: HandlerOptions,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues to fetch from, in priority order
    pub queues: Vec<String>,

    /// Number of cooperative executors
    pub concurrency: usize,

    /// Sleep between polls when every queue is empty
    pub poll_interval: Duration,

    /// Lease TTL written at fetch; heartbeats extend it
    pub lease_ttl: Duration,

    /// Safety margin subtracted from the lease for the handler deadline
    pub deadline_margin: Duration,

    /// Pushback when a job's concurrency lock is busy
    pub lock_backoff: Duration,

    /// Cadence of the orphan-recovery / purge maintenance pass
    pub maintenance_interval: Duration,

    /// Age after which terminal jobs are purged
    pub purge_after: Duration,

    /// How long in-flight jobs may finish during shutdown
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: vec![DEFAULT_QUEUE.to_string()],
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            poll_interval: Duration::from_millis(500),
            lease_ttl: Duration::from_secs(60),
            deadline_margin: Duration::from_secs(5),
            lock_backoff: Duration::from_secs(2),
            maintenance_interval: Duration::from_secs(15),
            purge_after: Duration::from_secs(7 * 24 * 3600),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// Worker: a pool of executors, each owning at most one lease at a time.
pub struct Worker {
    store: JobStore,
    registry: HashMap<String, Registration>,
    config: WorkerConfig,
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
    worker_id: String,
}

impl Worker {
    /// Create a worker with default configuration.
    pub fn new(store: JobStore) -> Self {
        Self::with_config(store, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(store: JobStore, config: WorkerConfig) -> Self {
        Self {
            store,
            registry: HashMap::new(),
            config,
            running: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// This worker's lease-token prefix.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Register a handler. Must be called before [`Worker::start`].
    pub fn register_handler<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: HandlerOptions,
        handler: F,
    ) where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let name = name.into();
        debug!(
            "Registering handler '{}' (queue '{}', {} retries)",
            name,
            options.queue,
            options.retry_delays.len()
        );

        let wrapped: JobHandler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.registry.insert(name, Registration {
            handler: wrapped,
            options,
        });
    }

    /// Start the executor pool and the maintenance loop.
    pub fn start(&mut self) -> QueueResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(QueueError::WorkerAlreadyRunning);
        }

        info!(
            "Worker {} starting: {} executors on queues {:?}",
            self.worker_id, self.config.concurrency, self.config.queues
        );

        let registry: Arc<HashMap<String, Registration>> =
            Arc::new(std::mem::take(&mut self.registry));

        for i in 0..self.config.concurrency {
            let store = self.store.clone();
            let registry = registry.clone();
            let config = self.config.clone();
            let running = self.running.clone();
            let token = format!("{}:{}", self.worker_id, i);

            let handle = tokio::spawn(async move {
                while running.load(Ordering::Relaxed) {
                    match store.fetch(&config.queues, &token, config.lease_ttl).await {
                        Ok(Some(job)) => {
                            process_one(&store, &registry, &config, &token, job).await;
                        }
                        Ok(None) => {
                            tokio::time::sleep(config.poll_interval).await;
                        }
                        Err(e) => {
                            error!("Executor {} fetch error: {}", token, e);
                            tokio::time::sleep(config.poll_interval).await;
                        }
                    }
                }
                debug!("Executor {} stopped", token);
            });

            self.handles.push(handle);
        }

        // Orphan recovery and purge, coordinated across processes by a
        // store lock so only one instance runs the pass per interval.
        {
            let store = self.store.clone();
            let config = self.config.clone();
            let running = self.running.clone();
            let token = format!("{}:maintenance", self.worker_id);

            let handle = tokio::spawn(async move {
                while running.load(Ordering::Relaxed) {
                    tokio::time::sleep(config.maintenance_interval).await;

                    let lock_ttl = config.maintenance_interval * 2;
                    match store.try_lock("maintenance", &token, lock_ttl).await {
                        Ok(true) => {
                            if let Err(e) = store.reenqueue_orphaned().await {
                                warn!("Orphan recovery failed: {}", e);
                            }
                            if let Err(e) = store.purge(config.purge_after).await {
                                warn!("Purge failed: {}", e);
                            }
                            if let Err(e) = store.unlock("maintenance", &token).await {
                                warn!("Maintenance unlock failed: {}", e);
                            }
                        }
                        Ok(false) => {}
                        Err(e) => warn!("Maintenance lock error: {}", e),
                    }
                }
            });

            self.handles.push(handle);
        }

        Ok(())
    }

    /// Stop fetching and let in-flight jobs finish within the grace window;
    /// anything still running afterwards is aborted and its lease recovered
    /// by the next maintenance pass without consuming an attempt.
    pub async fn stop(&mut self) -> QueueResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(QueueError::WorkerNotRunning);
        }

        info!(
            "Worker {} stopping; draining for up to {:?}",
            self.worker_id, self.config.shutdown_grace
        );

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        for mut handle in self.handles.drain(..) {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
            }
        }

        info!("Worker {} stopped", self.worker_id);
        Ok(())
    }

    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Drive one leased job through its handler and write the result state.
async fn process_one(
    store: &JobStore,
    registry: &HashMap<String, Registration>,
    config: &WorkerConfig,
    token: &str,
    job: Job,
) {
    let job_id = job.id;

    let Some(registration) = registry.get(&job.handler) else {
        error!("No handler registered for '{}' (job {})", job.handler, job_id);
        report_fail(store, token, job_id, &QueueError::NoHandler(job.handler.clone()).to_string(), None).await;
        return;
    };

    // Concurrency exclusion: jobs sharing a key never run side by side.
    let mut held_lock = None;
    let effective_key = job
        .concurrency_key
        .clone()
        .or_else(|| registration.options.default_concurrency_key.clone());
    if let Some(key) = effective_key {
        match store
            .try_lock(&key, token, registration.options.exclusion_window)
            .await
        {
            Ok(true) => held_lock = Some(key),
            Ok(false) => {
                debug!("Lock '{}' busy; pushing job {} back", key, job_id);
                if let Err(e) = store.release(job_id, token, config.lock_backoff).await {
                    warn!("Pushback of job {} failed: {}", job_id, e);
                }
                return;
            }
            Err(e) => {
                warn!("Lock '{}' error: {}; pushing job {} back", key, e, job_id);
                if let Err(e) = store.release(job_id, token, config.lock_backoff).await {
                    warn!("Pushback of job {} failed: {}", job_id, e);
                }
                return;
            }
        }
    }

    debug!(
        "Executor {} processing job {} ({}), attempt {}/{}",
        token, job_id, job.handler, job.attempts, job.max_attempts
    );

    // Keep the lease alive while the handler runs.
    let heartbeat = {
        let store = store.clone();
        let token = token.to_string();
        let lease_ttl = config.lease_ttl;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lease_ttl / 3);
            ticker.tick().await; // first tick is immediate
            loop {
                ticker.tick().await;
                if let Err(e) = store.heartbeat(job_id, &token, lease_ttl).await {
                    warn!("Heartbeat for job {} failed: {}", job_id, e);
                    break;
                }
            }
        })
    };

    let budget = config.lease_ttl.saturating_sub(config.deadline_margin);
    let ctx = JobContext {
        deadline: Utc::now() + chrono::Duration::from_std(budget).unwrap_or_default(),
        job: job.clone(),
    };

    let outcome = tokio::time::timeout(budget, (registration.handler)(ctx)).await;
    heartbeat.abort();

    match outcome {
        Ok(Ok(())) => match store.complete(job_id, token).await {
            Ok(()) => debug!("Job {} succeeded", job_id),
            Err(QueueError::LeaseLost(_)) => {
                warn!("Lease lost on job {} before completion; result discarded", job_id)
            }
            Err(e) => error!("Failed to complete job {}: {}", job_id, e),
        },
        Ok(Err(handler_err)) => {
            let retry_at = if handler_err.retryable {
                registration.options.retry_at(job.attempts)
            } else {
                None
            };
            report_fail(store, token, job_id, &handler_err.message, retry_at).await;
        }
        Err(_elapsed) => {
            let retry_at = registration.options.retry_at(job.attempts);
            report_fail(store, token, job_id, "handler deadline exceeded", retry_at).await;
        }
    }

    if let Some(key) = held_lock {
        if let Err(e) = store.unlock(&key, token).await {
            warn!("Releasing lock '{}' failed: {}", key, e);
        }
    }
}

async fn report_fail(
    store: &JobStore,
    token: &str,
    job_id: crate::job::JobId,
    message: &str,
    retry_at: Option<DateTime<Utc>>,
) {
    match store.fail(job_id, token, message, retry_at).await {
        Ok(FailOutcome::Retried) => {
            info!("Job {} failed, retry scheduled: {}", job_id, message)
        }
        Ok(FailOutcome::Discarded) => {
            error!("Job {} failed terminally: {}", job_id, message)
        }
        Err(QueueError::LeaseLost(_)) => {
            warn!("Lease lost on job {} before failure report", job_id)
        }
        Err(e) => error!("Failed to record failure of job {}: {}", job_id, e),
    }
}
