//! Durable background-job engine for the Pricewire pipeline.
//!
//! A Redis-backed job store shared by any number of worker processes:
//! - Atomic state transitions via Lua scripts (one document per job)
//! - Worker leases with heartbeats; crashed leases are recovered without
//!   consuming a retry
//! - Linear continuations: a child job starts only after its parent
//!   succeeds, and fails with it when the parent is discarded
//! - Named concurrency locks with bounded exclusion windows
//! - Bounded retry ladders per handler, with a `failed` queue for
//!   exhausted jobs
//! - Persisted recurring schedules fired by the cron scheduler crate
//!
//! # Examples
//!
//! ```no_run
//! use pricewire_queue::*;
//!
//! #[tokio::main]
//! async fn main() -> QueueResult<()> {
//!     let store = JobStore::connect(StoreConfig::new("redis://localhost:6379")).await?;
//!
//!     let job_id = store
//!         .enqueue(Job::new("email-poll", serde_json::json!({})))
//!         .await?;
//!
//!     let mut worker = Worker::new(store);
//!     worker.register_handler("email-poll", HandlerOptions::default(), |ctx| async move {
//!         println!("polling (attempt {})", ctx.attempt());
//!         Ok(())
//!     });
//!     worker.start()?;
//!
//!     let _ = job_id;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod job;
pub mod store;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use job::{Job, JobId, JobState, RecurringSchedule, DEFAULT_QUEUE, FAILED_QUEUE};
pub use store::{FailOutcome, JobStore, StoreConfig};
pub use worker::{
    HandlerError, HandlerOptions, HandlerResult, JobContext, JobHandler, Worker, WorkerConfig,
};
