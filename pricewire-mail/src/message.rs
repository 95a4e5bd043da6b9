//! Inbound message types.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A file attached to an inbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name as sent (unsanitized).
    pub filename: String,
    /// MIME type as sent.
    pub content_type: String,
    /// Raw attachment bytes.
    pub bytes: Bytes,
}

impl Attachment {
    /// Create an attachment.
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the attachment looks like a CSV file. The check is on the
    /// file name, case-insensitive; senders rarely set a useful MIME type.
    pub fn is_csv(&self) -> bool {
        let name = self.filename.to_ascii_lowercase();
        name.ends_with(".csv")
    }
}

/// An inbound e-mail message.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    /// Transport-scoped message id (POP3 UIDL, IMAP UID, or seeded).
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Subject line; empty when absent.
    pub subject: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Attachments in message order.
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    /// Attachments kept by the pipeline: CSV files only.
    pub fn csv_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_csv())
    }
}
