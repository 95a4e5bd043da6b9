//! Mail error types.

use thiserror::Error;

/// Result type for mail operations.
pub type Result<T> = std::result::Result<T, MailError>;

/// Mail errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP error.
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Protocol-level error from the mailbox server.
    #[error("{protocol} error: {message}")]
    Protocol {
        /// `POP3` or `IMAP`.
        protocol: &'static str,
        /// Server response or parse context.
        message: String,
    },

    /// Authentication error.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Message could not be parsed.
    #[error("Unparseable message: {0}")]
    Parse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bound transport does not support the operation.
    #[error("Operation not supported by the {0} transport")]
    Unsupported(&'static str),
}

impl MailError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Smtp(_) | Self::Protocol { .. } | Self::Tls(_) | Self::Io(_)
        )
    }

    pub(crate) fn pop3(message: impl Into<String>) -> Self {
        Self::Protocol {
            protocol: "POP3",
            message: message.into(),
        }
    }

    pub(crate) fn imap(message: impl Into<String>) -> Self {
        Self::Protocol {
            protocol: "IMAP",
            message: message.into(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Smtp(err.to_string())
    }
}

impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::Smtp(err.to_string())
    }
}
