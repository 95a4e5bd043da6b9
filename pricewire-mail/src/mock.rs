//! In-memory transport for tests and local development.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{EmailMessage, EmailTransport, MailError, Result};

/// A reply recorded by the mock transport.
#[derive(Debug, Clone)]
pub struct RecordedReply {
    /// Id of the message being acknowledged.
    pub message_id: String,
    /// Receipt body.
    pub body: String,
}

/// In-memory mailbox.
///
/// Test hooks: [`seed`](MockTransport::seed), [`clear`](MockTransport::clear),
/// [`is_processed`](MockTransport::is_processed) and
/// [`replies`](MockTransport::replies). Seeding an id that was already
/// marked processed does not resurface it: polls stay idempotent.
#[derive(Default)]
pub struct MockTransport {
    inbox: RwLock<Vec<EmailMessage>>,
    processed: RwLock<HashSet<String>>,
    replies: RwLock<Vec<RecordedReply>>,
}

impl MockTransport {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to the mailbox, replacing any unfetched message with
    /// the same id.
    pub async fn seed(&self, message: EmailMessage) {
        let mut inbox = self.inbox.write().await;
        inbox.retain(|m| m.id != message.id);
        inbox.push(message);
    }

    /// Drop every message, processed mark and recorded reply.
    pub async fn clear(&self) {
        self.inbox.write().await.clear();
        self.processed.write().await.clear();
        self.replies.write().await.clear();
    }

    /// Whether a message id has been marked processed.
    pub async fn is_processed(&self, message_id: &str) -> bool {
        self.processed.read().await.contains(message_id)
    }

    /// All recorded replies, in delivery order.
    pub async fn replies(&self) -> Vec<RecordedReply> {
        self.replies.read().await.clone()
    }

    /// Recorded replies for one message id.
    pub async fn replies_for(&self, message_id: &str) -> Vec<RecordedReply> {
        self.replies
            .read()
            .await
            .iter()
            .filter(|r| r.message_id == message_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EmailTransport for MockTransport {
    async fn fetch_new(&self) -> Result<Vec<EmailMessage>> {
        let processed = self.processed.read().await;
        let inbox = self.inbox.read().await;

        let new: Vec<EmailMessage> = inbox
            .iter()
            .filter(|m| !processed.contains(&m.id))
            .cloned()
            .collect();

        debug!("Mock mailbox: {} new of {} total", new.len(), inbox.len());
        Ok(new)
    }

    async fn send_reply(&self, message_id: &str, body: &str) -> Result<()> {
        let inbox = self.inbox.read().await;
        if !inbox.iter().any(|m| m.id == message_id) {
            return Err(MailError::Parse(format!(
                "no such message to reply to: {}",
                message_id
            )));
        }
        drop(inbox);

        self.replies.write().await.push(RecordedReply {
            message_id: message_id.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn mark_processed(&self, message_id: &str) -> Result<()> {
        self.processed.write().await.insert(message_id.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Attachment;
    use chrono::Utc;

    fn message(id: &str) -> EmailMessage {
        EmailMessage {
            id: id.to_string(),
            from: "supplier@example.com".to_string(),
            subject: "prices".to_string(),
            received_at: Utc::now(),
            attachments: vec![Attachment::new("p.csv", "text/csv", &b"a\n1"[..])],
        }
    }

    #[tokio::test]
    async fn test_fetch_skips_processed() {
        let mock = MockTransport::new();
        mock.seed(message("m1")).await;
        mock.seed(message("m2")).await;

        mock.mark_processed("m1").await.unwrap();

        let new = mock.fetch_new().await.unwrap();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].id, "m2");
    }

    #[tokio::test]
    async fn test_reseeding_processed_id_stays_processed() {
        let mock = MockTransport::new();
        mock.seed(message("m1")).await;
        mock.mark_processed("m1").await.unwrap();

        // The same id arriving again must not trigger a second run.
        mock.seed(message("m1")).await;
        assert!(mock.fetch_new().await.unwrap().is_empty());
        assert!(mock.is_processed("m1").await);
    }

    #[tokio::test]
    async fn test_replies_are_recorded_per_message() {
        let mock = MockTransport::new();
        mock.seed(message("m1")).await;

        mock.send_reply("m1", "Processed p.csv").await.unwrap();
        mock.send_reply("m1", "Processed q.csv").await.unwrap();

        assert_eq!(mock.replies().await.len(), 2);
        assert_eq!(mock.replies_for("m1").await.len(), 2);
        assert!(mock.replies_for("m2").await.is_empty());
    }

    #[tokio::test]
    async fn test_reply_to_unknown_message_fails() {
        let mock = MockTransport::new();
        assert!(mock.send_reply("ghost", "hello").await.is_err());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let mock = MockTransport::new();
        mock.seed(message("m1")).await;
        mock.mark_processed("m1").await.unwrap();
        mock.clear().await;

        assert!(mock.fetch_new().await.unwrap().is_empty());
        assert!(!mock.is_processed("m1").await);
    }
}
