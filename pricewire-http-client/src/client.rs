//! HTTP client implementation.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::{ApiClientConfig, ApiResponse, HttpClientError, Result};

/// Client for the price-list delivery endpoint.
#[derive(Clone)]
pub struct ApiClient {
    inner: reqwest::Client,
    config: Arc<ApiClientConfig>,
}

impl ApiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(HttpClientError::from)?;

        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    /// POST a JSON body to the configured endpoint and parse the response
    /// envelope. Non-2xx statuses and unparseable bodies are errors; the
    /// `success` flag inside the envelope is the caller's to interpret.
    pub async fn send<T: Serialize>(&self, body: &T) -> Result<ApiResponse> {
        self.post_json(&self.config.endpoint, body).await
    }

    /// POST a JSON body to an arbitrary path under the base URL.
    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        debug!(url = %url, "Posting payload");

        let mut request = self.inner.post(&url).json(body);

        if let Some(api_key) = &self.config.api_key {
            request = request.header("X-API-Key", api_key);
        }
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(HttpClientError::from)?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(HttpClientError::Response {
                status: status.as_u16(),
                message: truncate(&message, 512),
            });
        }

        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| HttpClientError::Json(e.to_string()))?;

        debug!(success = envelope.success, "Endpoint responded");
        Ok(envelope)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_creation() {
        let config = ApiClientConfig::new("https://api.example.com", "/batches")
            .with_timeout(Duration::from_secs(60));
        let client = ApiClient::new(config).unwrap();
        assert_eq!(client.config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 512), "short");
        let truncated = truncate(&"é".repeat(600), 512);
        assert!(truncated.len() <= 515);
        assert!(truncated.ends_with('…'));
    }
}
