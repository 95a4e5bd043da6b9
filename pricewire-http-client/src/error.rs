//! HTTP client error types.

use thiserror::Error;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-success response from the endpoint.
    #[error("Response error: {status} - {message}")]
    Response {
        /// HTTP status code.
        status: u16,
        /// Error message or body excerpt.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Underlying HTTP client error.
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
}

impl HttpClientError {
    /// Check if this error is retryable.
    ///
    /// The receiver is expected to be idempotent and delivery is
    /// at-least-once, so every failed delivery (transport trouble, any
    /// non-2xx status, an unreadable envelope) is worth another attempt
    /// under the job layer's bounded schedule. Only client-side
    /// configuration mistakes are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl(_))
    }
}

impl From<reqwest::Error> for HttpClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}
