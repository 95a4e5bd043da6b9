//! Batch dispatch handler: deliver one batch to the endpoint and, on the
//! terminal batch, send the completion receipt.

use chrono::Utc;
use pricewire_log::{debug, info, warn};
use pricewire_queue::{HandlerError, HandlerResult, JobContext};

use super::HandlerDeps;
use crate::payload::{ApiPayload, BatchJob};

/// Run one delivery.
///
/// Any transport error, non-2xx status, unparseable body or explicit
/// `success == false` is a retryable integration failure; the job engine
/// owns the backoff. A failed receipt is logged and swallowed: losing a
/// receipt beats re-delivering the whole batch.
pub async fn run(deps: &HandlerDeps, ctx: &JobContext) -> HandlerResult {
    let batch: BatchJob = ctx.payload()?;
    let payload = ApiPayload::from_batch(&batch);

    debug!(
        "Delivering '{}' batch {}/{} ({} rows)",
        batch.file.filename,
        batch.batch_number,
        batch.total_batches,
        batch.rows.len()
    );

    let response = deps.api.send(&payload).await.map_err(|e| {
        HandlerError::new(format!("batch delivery failed: {}", e), e.is_retryable())
    })?;

    if !response.success {
        return Err(HandlerError::retryable(format!(
            "endpoint rejected batch {}/{} of '{}': {}",
            batch.batch_number,
            batch.total_batches,
            batch.file.filename,
            response.message.as_deref().unwrap_or("no detail")
        )));
    }

    info!(
        "Delivered '{}' batch {}/{}",
        batch.file.filename, batch.batch_number, batch.total_batches
    );

    if batch.is_last() {
        let body = receipt_body(&batch);
        if let Err(e) = deps.transport.send_reply(&batch.file.email_id, &body).await {
            warn!(
                "Receipt for '{}' (message {}) failed: {}",
                batch.file.filename, batch.file.email_id, e
            );
        }
    }

    Ok(())
}

/// Human-readable completion receipt.
fn receipt_body(batch: &BatchJob) -> String {
    format!(
        "Your price list '{}' has been processed.\n\n\
         Batches delivered: {}\n\
         Completed at: {} UTC\n",
        batch.file.filename,
        batch.total_batches,
        Utc::now().format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FileJob;

    #[test]
    fn test_receipt_mentions_file_and_batch_count() {
        let batch = BatchJob {
            file: FileJob {
                email_id: "m1".to_string(),
                filename: "prices.csv".to_string(),
                sender: "s@example.com".to_string(),
                subject: "x".to_string(),
                received_at: Utc::now(),
                object_key: "k".to_string(),
            },
            batch_number: 3,
            total_batches: 3,
            header: vec![],
            rows: vec![],
        };

        let body = receipt_body(&batch);
        assert!(body.contains("prices.csv"));
        assert!(body.contains("Batches delivered: 3"));
        assert!(body.contains("UTC"));
    }
}
