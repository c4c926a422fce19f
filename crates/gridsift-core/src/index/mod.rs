//! Indexing orchestration
//!
//! Coordinates build discovery, artifact ingestion, reconciliation and
//! database writes.

pub mod incremental;

pub use incremental::{IncrementalIndexer, IndexerConfig};

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Artifact error: {0}")]
    Artifact(#[from] crate::artifacts::ArtifactError),
    #[error("Graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),
}

/// Result type for indexing operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Statistics from an indexing run
#[derive(Debug, Clone, Default)]
pub struct IndexingStats {
    /// Number of jobs visited
    pub jobs: usize,
    /// Number of builds considered after trimming to the most recent ones
    pub builds_discovered: usize,
    /// Builds skipped because their status was already persisted
    pub builds_done: usize,
    /// Builds without a finish marker yet
    pub builds_pending: usize,
    /// Builds processed in this run (or that would be, in a dry run)
    pub builds_indexed: usize,
    /// Test attempt rows written
    pub rows_written: usize,
    /// Total duration
    pub duration: Duration,
}

impl std::fmt::Display for IndexingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Indexing Statistics:")?;
        writeln!(f, "  Jobs:              {}", self.jobs)?;
        writeln!(f, "  Builds discovered: {}", self.builds_discovered)?;
        writeln!(f, "  Builds done:       {}", self.builds_done)?;
        writeln!(f, "  Builds pending:    {}", self.builds_pending)?;
        writeln!(f, "  Builds indexed:    {}", self.builds_indexed)?;
        writeln!(f, "  Rows written:      {}", self.rows_written)?;
        writeln!(f, "  Duration:          {:.2?}", self.duration)?;
        Ok(())
    }
}
