//! RFC 822/MIME decoding of fetched messages.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};

use crate::{Attachment, EmailMessage, MailError, Result};

/// Decode a raw message into the pipeline's message model.
///
/// `id` is the transport-scoped identifier (POP3 UIDL / IMAP UID); the
/// Message-ID header is not used because not every sender sets one.
pub(crate) fn parse_rfc822(id: &str, raw: &[u8]) -> Result<EmailMessage> {
    let message = MessageParser::new()
        .parse(raw)
        .ok_or_else(|| MailError::Parse(format!("message {} is not valid RFC 822", id)))?;

    let from = message
        .from()
        .and_then(|a| a.first())
        .and_then(|a| a.address())
        .unwrap_or_default()
        .to_string();

    let subject = message.subject().unwrap_or_default().to_string();

    let received_at = message
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let attachments = message
        .attachments()
        .map(|part| {
            let filename = part
                .attachment_name()
                .unwrap_or("attachment.bin")
                .to_string();

            let content_type = part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string());

            Attachment {
                filename,
                content_type,
                bytes: Bytes::copy_from_slice(part.contents()),
            }
        })
        .collect();

    Ok(EmailMessage {
        id: id.to_string(),
        from,
        subject,
        received_at,
        attachments,
    })
}
