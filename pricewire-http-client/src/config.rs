//! HTTP client configuration.

use std::time::Duration;

/// Configuration for the delivery endpoint client.
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the receiving service.
    pub base_url: String,
    /// Path the batch payloads are posted to.
    pub endpoint: String,
    /// API key sent as `X-API-Key`, if set.
    pub api_key: Option<String>,
    /// Token sent as `Authorization: Bearer`, if set.
    pub bearer_token: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl ApiClientConfig {
    /// Create a configuration for a base URL and endpoint path.
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            api_key: None,
            bearer_token: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("pricewire/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the API key header value.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the bearer token.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL for the configured endpoint.
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiClientConfig::new("https://api.example.com", "/pricelists/batches");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.api_key.is_none());
        assert!(config.bearer_token.is_none());
    }

    #[test]
    fn test_endpoint_url_joins_slashes() {
        let a = ApiClientConfig::new("https://api.example.com/", "/batches");
        let b = ApiClientConfig::new("https://api.example.com", "batches");
        assert_eq!(a.endpoint_url(), "https://api.example.com/batches");
        assert_eq!(b.endpoint_url(), "https://api.example.com/batches");
    }

    #[test]
    fn test_auth_builders() {
        let config = ApiClientConfig::new("https://api.example.com", "/b")
            .with_api_key("k-123")
            .with_bearer_token("t-456")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(config.api_key.as_deref(), Some("k-123"));
        assert_eq!(config.bearer_token.as_deref(), Some("t-456"));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
