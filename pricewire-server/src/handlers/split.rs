//! CSV split handler: read a stored file, type its fields, and build the
//! continuation chain of batch jobs.

use pricewire_log::{info, warn};
use pricewire_queue::{HandlerError, HandlerResult, Job, JobContext, JobId};

use super::{HandlerDeps, BATCH_DISPATCH};
use crate::payload::{BatchJob, FileJob};
use crate::table::{self, TableError};

/// Run one split.
///
/// Batch 1 is enqueued immediately; batch k gates on batch k−1 through the
/// store's continuation mechanism, which together with the per-email
/// concurrency key gives the strict in-order guarantee per file. A file
/// with a valid header and zero data rows succeeds without producing any
/// batch (no delivery, no receipt).
pub async fn run(deps: &HandlerDeps, ctx: &JobContext) -> HandlerResult {
    let descriptor: FileJob = ctx.payload()?;

    let bytes = deps
        .objects
        .get(&descriptor.object_key)
        .await
        .map_err(|e| {
            HandlerError::new(
                format!("fetching object '{}' failed: {}", descriptor.object_key, e),
                e.is_retryable(),
            )
        })?;

    let table = table::parse_csv(&bytes).map_err(|e| match e {
        // Bad data stays bad however often we retry it.
        TableError::EmptyHeader | TableError::Malformed(_) => {
            HandlerError::fatal(format!("'{}': {}", descriptor.filename, e))
        }
    })?;

    if table.rows.is_empty() {
        warn!(
            "'{}' has a header but no data rows; nothing to deliver",
            descriptor.filename
        );
        return Ok(());
    }

    let total_batches = table::batch_count(table.rows.len(), deps.batch_size);
    info!(
        "'{}': {} rows -> {} batch(es) of <= {}",
        descriptor.filename,
        table.rows.len(),
        total_batches,
        deps.batch_size
    );

    let mut parent: Option<JobId> = None;
    for (index, chunk) in table.rows.chunks(deps.batch_size).enumerate() {
        let batch = BatchJob {
            file: descriptor.clone(),
            batch_number: index + 1,
            total_batches,
            header: table.header.clone(),
            rows: chunk.to_vec(),
        };

        let payload = serde_json::to_value(&batch)
            .map_err(|e| HandlerError::fatal(format!("batch serialization failed: {}", e)))?;

        let job = Job::new(BATCH_DISPATCH, payload)
            .with_concurrency_key(format!("email:{}", descriptor.email_id))
            .with_max_attempts(deps.max_attempts());

        let id = match parent {
            None => deps.store.enqueue(job).await,
            Some(parent_id) => deps.store.enqueue_continuation(parent_id, job).await,
        }
        .map_err(|e| {
            HandlerError::new(
                format!(
                    "enqueueing batch {}/{} failed: {}",
                    index + 1,
                    total_batches,
                    e
                ),
                e.is_retryable(),
            )
        })?;

        parent = Some(id);
    }

    Ok(())
}
