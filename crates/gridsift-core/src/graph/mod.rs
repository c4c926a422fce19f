//! Graph database persistence using FalkorDB
//!
//! Provides schema definition, idempotent writes, and statistics queries.
//! The `IndexStore` trait is what the indexer depends on; `GraphWriter` is
//! the FalkorDB implementation and `MemoryIndexStore` the in-process one.

pub mod memory;
pub mod schema;
pub mod writer;

pub use memory::MemoryIndexStore;
pub use schema::GraphSchema;
pub use writer::GraphWriter;

pub use falkordb::FalkorValue;

use crate::{Build, BuildMeta, BuildStatus, ReconciledAttempt};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Query execution error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Persistence used by the indexer
///
/// Three logical tables, each keyed as noted. Saving an existing key is a
/// silent no-op, never an error.
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Cached file listing, keyed by `(job, build_id)`
    async fn load_build_meta(&self, build: &Build) -> GraphResult<Option<BuildMeta>>;

    async fn save_build_meta(&self, meta: &BuildMeta) -> GraphResult<()>;

    /// Status of a fully processed build, keyed by `(job, build_id)`
    async fn load_build_status(&self, build: &Build) -> GraphResult<Option<BuildStatus>>;

    async fn save_build_status(&self, build: &Build, status: &BuildStatus) -> GraphResult<()>;

    /// One test attempt, keyed by `(job, build_id, test, attempt)`
    async fn save_test_result(&self, row: &ReconciledAttempt) -> GraphResult<()>;
}
