//! Object storage for price-list attachments.
//!
//! The pipeline stages never hold attachment bytes across job boundaries;
//! they pass opaque object keys through the job store and fetch content
//! from an [`ObjectStore`] backend:
//! - [`S3Store`]: any S3-compatible service (custom endpoint, path-style,
//!   static credentials)
//! - [`MemoryStore`]: in-process backend for tests

pub mod error;
pub mod memory;
pub mod s3;
pub mod storage;

pub use error::{Result, StorageError};
pub use memory::MemoryStore;
pub use s3::{S3Config, S3Store};
pub use storage::{sanitize_filename, ObjectStore, ObjectStream};
