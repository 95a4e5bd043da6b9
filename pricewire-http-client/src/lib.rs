//! HTTP client for the external price-list endpoint.
//!
//! Deliberately thin: delivery retries belong to the job engine, which
//! accounts attempts against each batch job's retry budget. The client
//! owns connection pooling, auth headers and the request timeout, and
//! returns the receiver's typed envelope.

pub mod client;
pub mod config;
pub mod error;
pub mod response;

pub use client::ApiClient;
pub use config::ApiClientConfig;
pub use error::{HttpClientError, Result};
pub use response::ApiResponse;
