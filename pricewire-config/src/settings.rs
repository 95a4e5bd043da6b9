//! Typed settings consumed by the application.

use serde::Deserialize;
use std::path::Path;

use crate::{apply_env_overrides, ConfigError, ConfigLoader, Result};

/// Which mailbox transport to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProvider {
    Pop3,
    Imap,
    Mock,
}

/// Which object-store backend to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

/// Host/port/credential triple for a mailbox server.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MailboxSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub ssl: bool,
}

/// Outbound SMTP settings for completion receipts.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
    pub from: String,
}

/// E-mail section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub provider: EmailProvider,
    pub pop3: MailboxSettings,
    pub imap: MailboxSettings,
    pub smtp: SmtpSettings,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            provider: EmailProvider::Mock,
            pop3: MailboxSettings::default(),
            imap: MailboxSettings::default(),
            smtp: SmtpSettings::default(),
        }
    }
}

/// Object-store section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ObjectStoreSettings {
    pub backend: StorageBackend,
    pub endpoint: String,
    #[serde(alias = "accessKey")]
    pub access_key: String,
    #[serde(alias = "secretKey")]
    pub secret_key: String,
    pub bucket: String,
    pub ssl: bool,
    /// Optional prefix for every object key (test isolation).
    #[serde(alias = "keyPrefix")]
    pub key_prefix: Option<String>,
}

/// Delivery-endpoint section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    pub endpoint: String,
    #[serde(alias = "apiKey")]
    pub api_key: Option<String>,
    #[serde(alias = "bearerToken")]
    pub bearer_token: Option<String>,
    #[serde(alias = "timeoutSeconds")]
    pub timeout_seconds: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            endpoint: "/api/pricelists/batches".to_string(),
            api_key: None,
            bearer_token: None,
            timeout_seconds: 30,
        }
    }
}

/// Recurring-poll section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    #[serde(alias = "cronExpression")]
    pub cron_expression: String,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            cron_expression: "*/5 * * * *".to_string(),
        }
    }
}

/// Job-engine section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsSettings {
    #[serde(alias = "redisUrl")]
    pub redis_url: String,
    #[serde(alias = "keyPrefix")]
    pub key_prefix: String,
    /// Executor count; defaults to available parallelism when unset.
    #[serde(alias = "workerCount")]
    pub worker_count: Option<usize>,
    #[serde(alias = "retryDelaysSeconds")]
    pub retry_delays_seconds: Vec<u64>,
    #[serde(alias = "leaseTtlSeconds")]
    pub lease_ttl_seconds: u64,
    /// Rows per delivery batch.
    #[serde(alias = "batchSize")]
    pub batch_size: usize,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "pricewire".to_string(),
            worker_count: None,
            retry_delays_seconds: vec![300, 600, 900],
            lease_ttl_seconds: 60,
            batch_size: 1000,
        }
    }
}

/// Control-plane server section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Complete application settings.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub email: EmailSettings,
    #[serde(alias = "objectStore")]
    pub object_store: ObjectStoreSettings,
    pub api: ApiSettings,
    #[serde(alias = "emailPolling")]
    pub email_polling: PollingSettings,
    pub jobs: JobsSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings: optional file, then `PRICEWIRE_` env overrides, then
    /// validation. Every failure here is fatal at startup.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut value = match path {
            Some(path) => ConfigLoader::auto(path)?.load_file(path)?,
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        apply_env_overrides(&mut value);

        let settings: Settings = serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Structural validation beyond what serde can express.
    pub fn validate(&self) -> Result<()> {
        match self.email.provider {
            EmailProvider::Pop3 => {
                if self.email.pop3.host.is_empty() {
                    return Err(ConfigError::Validation(
                        "email.provider is pop3 but email.pop3.host is empty".into(),
                    ));
                }
            }
            EmailProvider::Imap => {
                if self.email.imap.host.is_empty() {
                    return Err(ConfigError::Validation(
                        "email.provider is imap but email.imap.host is empty".into(),
                    ));
                }
            }
            EmailProvider::Mock => {}
        }

        if self.object_store.backend == StorageBackend::S3 {
            if self.object_store.endpoint.is_empty() {
                return Err(ConfigError::Validation("object_store.endpoint is empty".into()));
            }
            if self.object_store.bucket.is_empty() {
                return Err(ConfigError::Validation("object_store.bucket is empty".into()));
            }
        }

        if self.api.base_url.is_empty() {
            return Err(ConfigError::Validation("api.base_url is empty".into()));
        }

        if self.jobs.batch_size == 0 {
            return Err(ConfigError::Validation("jobs.batch_size must be positive".into()));
        }
        if self.jobs.lease_ttl_seconds < 10 {
            return Err(ConfigError::Validation(
                "jobs.lease_ttl_seconds must be at least 10".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid() -> serde_json::Value {
        serde_json::json!({
            "email": {"provider": "mock"},
            "object_store": {"backend": "memory"},
            "api": {"base_url": "https://api.example.com"}
        })
    }

    #[test]
    fn test_defaults_fill_in() {
        let settings: Settings = serde_json::from_value(minimal_valid()).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.email_polling.cron_expression, "*/5 * * * *");
        assert_eq!(settings.jobs.retry_delays_seconds, vec![300, 600, 900]);
        assert_eq!(settings.jobs.lease_ttl_seconds, 60);
        assert_eq!(settings.jobs.batch_size, 1000);
        assert_eq!(settings.api.timeout_seconds, 30);
        assert_eq!(settings.jobs.key_prefix, "pricewire");
    }

    #[test]
    fn test_camel_case_aliases_accepted() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "email": {"provider": "mock"},
            "objectStore": {"backend": "memory", "accessKey": "ak"},
            "api": {"baseUrl": "https://api.example.com", "timeoutSeconds": 10},
            "emailPolling": {"cronExpression": "*/2 * * * *"},
            "jobs": {"retryDelaysSeconds": [60], "leaseTtlSeconds": 30}
        }))
        .unwrap();

        assert_eq!(settings.api.timeout_seconds, 10);
        assert_eq!(settings.object_store.access_key, "ak");
        assert_eq!(settings.email_polling.cron_expression, "*/2 * * * *");
        assert_eq!(settings.jobs.retry_delays_seconds, vec![60]);
    }

    #[test]
    fn test_pop3_requires_host() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "email": {"provider": "pop3"},
            "object_store": {"backend": "memory"},
            "api": {"base_url": "https://api.example.com"}
        }))
        .unwrap();

        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_s3_requires_endpoint_and_bucket() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "email": {"provider": "mock"},
            "api": {"base_url": "https://api.example.com"}
        }))
        .unwrap();

        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_api_base_url_is_fatal() {
        let settings: Settings = serde_json::from_value(serde_json::json!({
            "email": {"provider": "mock"},
            "object_store": {"backend": "memory"}
        }))
        .unwrap();

        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = serde_json::from_value::<Settings>(serde_json::json!({
            "email": {"provider": "exchange"}
        }));
        assert!(result.is_err());
    }
}
