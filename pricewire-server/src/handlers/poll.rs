//! Mailbox poll handler: fetch new messages, stash CSV attachments in the
//! object store, and fan out one split job per attachment.

use chrono::{Datelike, Utc};
use pricewire_log::{debug, info};
use pricewire_mail::{Attachment, EmailMessage};
use pricewire_queue::{HandlerError, HandlerResult, Job, JobContext};
use pricewire_storage::sanitize_filename;
use uuid::Uuid;

use super::{HandlerDeps, CSV_SPLIT};
use crate::payload::FileJob;

/// Object key for one attachment: `csv-files/YYYY/MM/DD/<uuid>_<name>`.
fn object_key(attachment: &Attachment) -> String {
    let today = Utc::now();
    format!(
        "csv-files/{:04}/{:02}/{:02}/{}_{}",
        today.year(),
        today.month(),
        today.day(),
        Uuid::new_v4(),
        sanitize_filename(&attachment.filename)
    )
}

/// Run one poll.
///
/// A message is marked processed only after every CSV attachment is stored
/// and its split job enqueued; a failure mid-message fails the whole poll,
/// and messages completed earlier stay processed. Messages without CSV
/// attachments are marked processed immediately.
pub async fn run(deps: &HandlerDeps, _ctx: &JobContext) -> HandlerResult {
    let messages = deps.transport.fetch_new().await.map_err(|e| {
        HandlerError::new(format!("mailbox fetch failed: {}", e), e.is_retryable())
    })?;

    if messages.is_empty() {
        debug!("Mailbox poll: nothing new");
        return Ok(());
    }

    info!("Mailbox poll: {} new messages", messages.len());

    for message in &messages {
        let enqueued = ingest_message(deps, message).await?;

        deps.transport
            .mark_processed(&message.id)
            .await
            .map_err(|e| {
                HandlerError::new(
                    format!("marking message {} processed failed: {}", message.id, e),
                    e.is_retryable(),
                )
            })?;

        info!(
            "Message {} from {}: {} price-list file(s) queued",
            message.id, message.from, enqueued
        );
    }

    Ok(())
}

/// Store each CSV attachment and enqueue its split job. Returns how many
/// files were queued.
async fn ingest_message(deps: &HandlerDeps, message: &EmailMessage) -> Result<u32, HandlerError> {
    let mut enqueued = 0u32;

    for attachment in message.csv_attachments() {
        let key = object_key(attachment);

        deps.objects
            .put(&key, attachment.bytes.clone())
            .await
            .map_err(|e| {
                HandlerError::new(
                    format!("storing attachment '{}' failed: {}", key, e),
                    e.is_retryable(),
                )
            })?;

        let descriptor = FileJob {
            email_id: message.id.clone(),
            filename: attachment.filename.clone(),
            sender: message.from.clone(),
            subject: message.subject.clone(),
            received_at: message.received_at,
            object_key: key.clone(),
        };

        let payload = serde_json::to_value(&descriptor)
            .map_err(|e| HandlerError::fatal(format!("descriptor serialization failed: {}", e)))?;

        let job = Job::new(CSV_SPLIT, payload)
            .with_concurrency_key(format!("csv-split:{}", key))
            .with_max_attempts(deps.max_attempts());

        deps.store.enqueue(job).await.map_err(|e| {
            HandlerError::new(
                format!("enqueueing split for '{}' failed: {}", key, e),
                e.is_retryable(),
            )
        })?;

        enqueued += 1;
    }

    Ok(enqueued)
}
