//! S3-compatible storage backend (AWS S3, MinIO, and friends).

use async_trait::async_trait;
use aws_sdk_s3::{config::Credentials, primitives::ByteStream, Client};
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::{ObjectStore, ObjectStream, Result, StorageError};

/// S3 storage configuration.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint host (and optional port), without a scheme.
    pub endpoint: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Bucket name.
    pub bucket: String,
    /// Whether to talk TLS to the endpoint.
    pub ssl: bool,
    /// Region; S3-compatible stores generally accept anything.
    pub region: String,
    /// Optional prefix put in front of every key (test isolation).
    pub key_prefix: Option<String>,
}

impl S3Config {
    /// Create configuration for a bucket behind an endpoint.
    pub fn new(
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            ssl: false,
            region: "us-east-1".to_string(),
            key_prefix: None,
        }
    }

    /// Enable TLS to the endpoint.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Set the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    fn endpoint_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.endpoint)
    }
}

/// S3-compatible storage backend.
pub struct S3Store {
    client: Client,
    config: S3Config,
}

impl S3Store {
    /// Build a client for the configured endpoint with static credentials
    /// and path-style addressing (the form MinIO-style stores require).
    pub fn connect(config: S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(StorageError::Config("bucket must not be empty".into()));
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "pricewire-static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "Initialized S3 object store"
        );

        Ok(Self { client, config })
    }

    /// Create from an existing AWS SDK client.
    pub fn from_client(client: Client, config: S3Config) -> Self {
        Self { client, config }
    }

    fn full_key(&self, key: &str) -> String {
        match &self.config.key_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        let full_key = self.full_key(key);
        debug!(key = %full_key, size = data.len(), "Uploading object");

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let full_key = self.full_key(key);

        let output = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    StorageError::NotFound(full_key.clone())
                } else {
                    StorageError::Backend(service.to_string())
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn get_stream(&self, key: &str) -> Result<ObjectStream> {
        let full_key = self.full_key(key);

        let output = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_no_such_key() {
                    StorageError::NotFound(full_key.clone())
                } else {
                    StorageError::Backend(service.to_string())
                }
            })?;

        let reader = output.body.into_async_read();
        let stream = ReaderStream::new(reader).map(|chunk| chunk.map_err(StorageError::from));
        Ok(Box::pin(stream))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key);

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key);

        match self
            .client
            .head_object()
            .bucket(&self.config.bucket)
            .key(&full_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::Backend(service.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_scheme_follows_ssl_flag() {
        let plain = S3Config::new("minio:9000", "ak", "sk", "csv");
        assert_eq!(plain.endpoint_url(), "http://minio:9000");

        let tls = S3Config::new("minio:9000", "ak", "sk", "csv").with_ssl(true);
        assert_eq!(tls.endpoint_url(), "https://minio:9000");
    }

    #[test]
    fn test_key_prefix_applies() {
        let config = S3Config::new("minio:9000", "ak", "sk", "csv").with_key_prefix("test-42/");
        let store = S3Store::connect(config).unwrap();

        assert_eq!(
            store.full_key("csv-files/2024/01/15/x.csv"),
            "test-42/csv-files/2024/01/15/x.csv"
        );
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let config = S3Config::new("minio:9000", "ak", "sk", "");
        assert!(S3Store::connect(config).is_err());
    }
}
