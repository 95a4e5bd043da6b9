//! Response envelope of the delivery endpoint.

use serde::{Deserialize, Serialize};

/// The receiving service's response envelope.
///
/// `success` is explicit: a 2xx status with `success == false` is still a
/// delivery failure and is retried by the job layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the batch was accepted.
    pub success: bool,

    /// Human-readable detail.
    #[serde(default)]
    pub message: Option<String>,

    /// Receiver-defined extra payload.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}
