//! Remote object store access
//!
//! Provides the `ObjectStore` abstraction, a Google Cloud Storage backend,
//! an in-memory backend, the local download cache, and listing helpers.

pub mod browser;
pub mod cache;
pub mod gcs;
pub mod memory;

pub use cache::ObjectCache;
pub use gcs::{GcsConfig, GcsStore};
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: gs://{bucket}/{object}")]
    NotFound { bucket: String, object: String },
    #[error("Object store unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected listing result: {0}")]
    ContractViolation(String),
    #[error("Invalid object name: {0}")]
    InvalidName(String),
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(bucket: &str, object: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            object: object.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// One (fully paginated) listing response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Common prefixes ("directories"), each ending with the delimiter
    pub prefixes: Vec<String>,
    /// Object names directly matched by the query
    pub objects: Vec<String>,
}

/// Read-only access to a bucketed object store
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync {
    /// List objects under `prefix`
    ///
    /// With a delimiter, names containing it past the prefix are rolled up into
    /// `prefixes`; without one, every object under the prefix is returned.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> StoreResult<Listing>;

    /// Read the full content of an object
    async fn read(&self, bucket: &str, object: &str) -> StoreResult<Vec<u8>>;
}
