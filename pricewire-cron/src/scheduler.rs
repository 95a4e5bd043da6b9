//! Distributed recurring-job scheduler.
//!
//! Any number of instances may run; each tick races for a store lock, so
//! one instance does the work per tick. Firing a schedule is
//! compare-and-set on its next fire time: an instance that slips past the
//! lock cannot double-fire.

use crate::error::{CronError, CronResult};
use crate::expression::CronExpression;
use chrono::Utc;
use pricewire_log::{debug, error, info, warn};
use pricewire_queue::{Job, JobStore, RecurringSchedule};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Name of the store lock serializing scheduler ticks across instances.
const TICK_LOCK: &str = "scheduler";

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Tick cadence for promotion and recurring fires
    pub tick_interval: Duration,

    /// TTL of the tick lock; must exceed the longest tick
    pub lock_ttl: Duration,

    /// Scheduled jobs promoted per tick
    pub promote_batch: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            lock_ttl: Duration::from_secs(5),
            promote_batch: 128,
        }
    }
}

/// Cron-driven scheduler over the shared job store.
pub struct Scheduler {
    store: JobStore,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    instance_id: String,
}

impl Scheduler {
    /// Create a scheduler with default configuration.
    pub fn new(store: JobStore) -> Self {
        Self::with_config(store, SchedulerConfig::default())
    }

    /// Create a scheduler with custom configuration.
    pub fn with_config(store: JobStore, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            instance_id: format!("scheduler-{}", Uuid::new_v4()),
        }
    }

    /// Validate and persist a recurring schedule, replacing any existing
    /// entry with the same name.
    pub async fn ensure_schedule(
        &self,
        name: impl Into<String>,
        cron_expr: &str,
        handler: impl Into<String>,
        payload: serde_json::Value,
    ) -> CronResult<()> {
        let name = name.into();
        let expr = CronExpression::parse(cron_expr)?;
        let next = expr
            .next()
            .ok_or_else(|| CronError::NoUpcomingFire(cron_expr.to_string()))?;

        let schedule =
            RecurringSchedule::new(name, cron_expr, handler, next).with_payload(payload);
        self.store.upsert_recurring(&schedule).await?;
        Ok(())
    }

    /// Start the tick loop.
    pub fn start(&mut self) -> CronResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CronError::SchedulerAlreadyRunning);
        }

        info!(
            "Scheduler {} started (tick {:?})",
            self.instance_id, self.config.tick_interval
        );

        let store = self.store.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let token = self.instance_id.clone();

        let handle = tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                tick(&store, &config, &token).await;
                tokio::time::sleep(config.tick_interval).await;
            }
            debug!("Scheduler {} loop exited", token);
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the tick loop.
    pub async fn stop(&mut self) -> CronResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(CronError::SchedulerNotRunning);
        }

        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        info!("Scheduler {} stopped", self.instance_id);
        Ok(())
    }

    /// Check if the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// One scheduler pass: promote due retries/delays, then fire due schedules.
/// Failures are logged and never terminate the loop.
async fn tick(store: &JobStore, config: &SchedulerConfig, token: &str) {
    match store.try_lock(TICK_LOCK, token, config.lock_ttl).await {
        Ok(true) => {}
        Ok(false) => return, // another instance owns this tick
        Err(e) => {
            warn!("Tick lock error: {}", e);
            return;
        }
    }

    if let Err(e) = store.promote_due(config.promote_batch).await {
        warn!("Promotion pass failed: {}", e);
    }

    match store.due_recurring(Utc::now()).await {
        Ok(due) => {
            for schedule in due {
                fire(store, &schedule).await;
            }
        }
        Err(e) => warn!("Reading due schedules failed: {}", e),
    }

    if let Err(e) = store.unlock(TICK_LOCK, token).await {
        warn!("Tick unlock failed: {}", e);
    }
}

/// Fire one recurring schedule: advance its bookkeeping first (CAS), then
/// enqueue the fresh job. Losing the CAS means another instance fired.
async fn fire(store: &JobStore, schedule: &RecurringSchedule) {
    let expr = match CronExpression::parse(&schedule.cron_expr) {
        Ok(expr) => expr,
        Err(e) => {
            error!("Schedule '{}' has a bad expression: {}", schedule.name, e);
            return;
        }
    };

    let now = Utc::now();
    let Some(next) = expr.next_after(now) else {
        error!(
            "Schedule '{}' has no upcoming fire; leaving it parked",
            schedule.name
        );
        return;
    };

    match store
        .reschedule_recurring(&schedule.name, now, next, schedule.next_fire_at)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            debug!("Schedule '{}' already fired elsewhere", schedule.name);
            return;
        }
        Err(e) => {
            warn!("Advancing schedule '{}' failed: {}", schedule.name, e);
            return;
        }
    }

    let job = Job::new(&schedule.handler, schedule.payload.clone()).with_queue(&schedule.queue);
    match store.enqueue(job).await {
        Ok(id) => info!(
            "Schedule '{}' fired job {} (next fire {})",
            schedule.name, id, next
        ),
        Err(e) => error!("Schedule '{}' fire enqueue failed: {}", schedule.name, e),
    }
}
