//! The mailbox transport contract.

use async_trait::async_trait;

use crate::{EmailMessage, Result};

/// A mailbox the pipeline polls for new price-list messages.
///
/// Implementations must be safe to call from concurrent jobs; the poll
/// handler additionally serializes polls with a concurrency key, so
/// `fetch_new` is effectively single-flight per deployment.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Retrieve messages not yet marked processed.
    async fn fetch_new(&self) -> Result<Vec<EmailMessage>>;

    /// Send a short receipt back to the sender of `message_id`.
    ///
    /// Transports without an outbound channel log and succeed; losing a
    /// receipt is preferred over re-delivering a whole file.
    async fn send_reply(&self, message_id: &str, body: &str) -> Result<()>;

    /// Mark a message processed so later polls skip it.
    async fn mark_processed(&self, message_id: &str) -> Result<()>;

    /// Transport identity, e.g. `pop3`, `imap`, `mock`.
    fn name(&self) -> &'static str;
}
