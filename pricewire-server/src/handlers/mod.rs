//! Pipeline job handlers: poll, split, dispatch.

pub mod dispatch;
pub mod poll;
pub mod split;

use pricewire_http_client::ApiClient;
use pricewire_mail::EmailTransport;
use pricewire_queue::{HandlerOptions, JobStore, Worker};
use pricewire_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// Handler name of the mailbox poll (C4).
pub const EMAIL_POLL: &str = "email-poll";
/// Handler name of the CSV split (C5).
pub const CSV_SPLIT: &str = "csv-split";
/// Handler name of the batch dispatch (C6).
pub const BATCH_DISPATCH: &str = "batch-dispatch";

/// Exclusion window for the mailbox poll lock.
const POLL_WINDOW: Duration = Duration::from_secs(300);
/// Exclusion window for the per-file split lock.
const SPLIT_WINDOW: Duration = Duration::from_secs(600);
/// Exclusion window for the per-email dispatch lock.
const DISPATCH_WINDOW: Duration = Duration::from_secs(300);

/// Shared dependencies of every pipeline handler.
pub struct HandlerDeps {
    pub store: JobStore,
    pub transport: Arc<dyn EmailTransport>,
    pub objects: Arc<dyn ObjectStore>,
    pub api: ApiClient,
    /// Rows per delivery batch.
    pub batch_size: usize,
    /// Retry ladder applied to every pipeline job.
    pub retry_delays: Vec<Duration>,
}

impl HandlerDeps {
    /// Attempt budget implied by the retry ladder.
    pub fn max_attempts(&self) -> u32 {
        self.retry_delays.len() as u32 + 1
    }
}

/// Register the three pipeline handlers on a worker.
pub fn register_all(worker: &mut Worker, deps: Arc<HandlerDeps>) {
    let poll_options = HandlerOptions::default()
        .with_retry_delays(deps.retry_delays.clone())
        .with_exclusion_window(POLL_WINDOW)
        .with_default_concurrency_key(EMAIL_POLL);
    let poll_deps = deps.clone();
    worker.register_handler(EMAIL_POLL, poll_options, move |ctx| {
        let deps = poll_deps.clone();
        async move { poll::run(&deps, &ctx).await }
    });

    let split_options = HandlerOptions::default()
        .with_retry_delays(deps.retry_delays.clone())
        .with_exclusion_window(SPLIT_WINDOW);
    let split_deps = deps.clone();
    worker.register_handler(CSV_SPLIT, split_options, move |ctx| {
        let deps = split_deps.clone();
        async move { split::run(&deps, &ctx).await }
    });

    let dispatch_options = HandlerOptions::default()
        .with_retry_delays(deps.retry_delays.clone())
        .with_exclusion_window(DISPATCH_WINDOW);
    let dispatch_deps = deps;
    worker.register_handler(BATCH_DISPATCH, dispatch_options, move |ctx| {
        let deps = dispatch_deps.clone();
        async move { dispatch::run(&deps, &ctx).await }
    });
}
