//! CI artifact access
//!
//! Turns a job prefix into builds, resolves build listings and statuses, and
//! extracts test results from JUnit reports and build logs.

pub mod builds;
pub mod junit;
pub mod logs;

use crate::store::{ObjectCache, ObjectStore, StoreError};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid job prefix for {job}: {prefix}")]
    InvalidPrefix { job: String, prefix: String },
    #[error("Unable to parse manifest gs://{bucket}/{object}: {source}")]
    MalformedManifest {
        bucket: String,
        object: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unable to parse report gs://{bucket}/{object}: {reason}")]
    MalformedReport {
        bucket: String,
        object: String,
        reason: String,
    },
    #[error("Invalid artifact pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Parser pool error: {0}")]
    Pool(String),
}

/// Result type for artifact operations
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Object name patterns selecting reports and logs out of a build listing
#[derive(Debug, Clone)]
pub struct ArtifactPatterns {
    pub report: Regex,
    pub log: Regex,
}

impl ArtifactPatterns {
    pub const DEFAULT_REPORT: &'static str = r"/junit.*\.xml$";
    pub const DEFAULT_LOG: &'static str = r"/build-log\.txt$";

    pub fn new(report: &str, log: &str) -> ArtifactResult<Self> {
        Ok(Self {
            report: Regex::new(report)?,
            log: Regex::new(log)?,
        })
    }
}

impl Default for ArtifactPatterns {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REPORT, Self::DEFAULT_LOG).expect("default patterns are valid")
    }
}

/// Configuration for the artifact client
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    /// Local download cache directory
    pub cache_dir: PathBuf,
    pub patterns: ArtifactPatterns,
    /// Number of threads decoding reports
    pub threads: usize,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            patterns: ArtifactPatterns::default(),
            threads: num_cpus::get(),
        }
    }
}

/// Entry point for everything read from the artifact store
pub struct ArtifactClient {
    store: Arc<dyn ObjectStore>,
    cache: ObjectCache,
    patterns: ArtifactPatterns,
    pool: Arc<rayon::ThreadPool>,
}

impl ArtifactClient {
    pub fn new(store: Arc<dyn ObjectStore>, config: ArtifactConfig) -> ArtifactResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads.max(1))
            .thread_name(|i| format!("gridsift-junit-{}", i))
            .build()
            .map_err(|e| ArtifactError::Pool(e.to_string()))?;

        Ok(Self {
            cache: ObjectCache::new(config.cache_dir, Arc::clone(&store)),
            store,
            patterns: config.patterns,
            pool: Arc::new(pool),
        })
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    pub fn patterns(&self) -> &ArtifactPatterns {
        &self.patterns
    }
}

impl std::fmt::Debug for ArtifactClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactClient")
            .field("cache", &self.cache)
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns() {
        let patterns = ArtifactPatterns::default();
        assert!(patterns.report.is_match("logs/job/1/artifacts/junit_e2e_01.xml"));
        assert!(patterns.report.is_match("logs/job/1/junit.xml"));
        assert!(!patterns.report.is_match("logs/job/1/artifacts/junit.xml.gz"));
        assert!(!patterns.report.is_match("logs/job/1/report-junit.xml"));
        assert!(patterns.log.is_match("logs/job/1/build-log.txt"));
        assert!(patterns.log.is_match("logs/job/1/artifacts/e2e/build-log.txt"));
        assert!(!patterns.log.is_match("logs/job/1/build-logXtxt"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = ArtifactPatterns::new("(", ArtifactPatterns::DEFAULT_LOG).unwrap_err();
        assert!(matches!(err, ArtifactError::Pattern(_)));
    }
}
