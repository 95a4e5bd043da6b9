//! Mailbox transports for the Pricewire pipeline.
//!
//! Inbound: [`Pop3Transport`], [`ImapTransport`] and the in-memory
//! [`MockTransport`] behind one [`EmailTransport`] trait. Outbound:
//! [`ReplyMailer`] delivers completion receipts over SMTP (the IMAP
//! transport's reply channel; POP3 has none and drops receipts with a
//! warning).

pub mod error;
pub mod imap;
pub mod message;
pub mod mock;
mod net;
mod mime;
pub mod pop3;
pub mod smtp;
pub mod transport;

pub use error::{MailError, Result};
pub use imap::{ImapConfig, ImapTransport};
pub use message::{Attachment, EmailMessage};
pub use mock::{MockTransport, RecordedReply};
pub use pop3::{Pop3Config, Pop3Transport};
pub use smtp::{ReplyMailer, SmtpConfig};
pub use transport::EmailTransport;
