//! Object store trait and key helpers.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::Result;

/// Byte stream returned by [`ObjectStore::get_stream`].
pub type ObjectStream = BoxStream<'static, Result<Bytes>>;

/// Object storage backend.
///
/// Keys are opaque strings; layout conventions (dated prefixes, tenant
/// prefixes) belong to the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under a key, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Retrieve the full object.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Retrieve the object as a byte stream.
    async fn get_stream(&self, key: &str) -> Result<ObjectStream>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether an object exists.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Sanitize a file name for embedding in an object key.
///
/// Strips path components and replaces characters that are unsafe in keys
/// or downstream file systems.
pub fn sanitize_filename(name: &str) -> String {
    let name = std::path::Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());

    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("prices/2024.csv"), "2024.csv");
    }

    #[test]
    fn test_sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a:b*c?.csv"), "a_b_c_.csv");
        assert_eq!(sanitize_filename("price\tlist.csv"), "price_list.csv");
    }

    #[test]
    fn test_sanitize_keeps_ordinary_names() {
        assert_eq!(sanitize_filename("Price List Q1.csv"), "Price List Q1.csv");
        assert_eq!(sanitize_filename("prices-2024_v2.CSV"), "prices-2024_v2.CSV");
    }

    #[test]
    fn test_sanitize_drops_leading_dots() {
        assert_eq!(sanitize_filename(".hidden.csv"), "hidden.csv");
    }
}
