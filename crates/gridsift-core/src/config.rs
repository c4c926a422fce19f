//! Configuration file
//!
//! ```toml
//! cache_dir = "./cache"
//! max_builds = 5
//!
//! [[jobs]]
//! name = "e2e-aws"
//! prefix = "origin-ci-test/logs/e2e-aws/"
//!
//! [signature]
//! error_patterns = ["error", "fail"]
//! ```

use crate::artifacts::{ArtifactPatterns, ArtifactResult};
use crate::signature::SignatureConfig;
use crate::store::GcsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A CI job and the store prefix its builds live under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// `bucket/path/to/job/`, optionally with a `gs://` scheme
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let gcs = GcsConfig::default();
        Self {
            endpoint: gcs.endpoint,
            timeout_secs: gcs.timeout.as_secs(),
        }
    }
}

impl StoreConfig {
    pub fn gcs(&self) -> GcsConfig {
        GcsConfig {
            endpoint: self.endpoint.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub report_pattern: String,
    pub log_pattern: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            report_pattern: ArtifactPatterns::DEFAULT_REPORT.to_string(),
            log_pattern: ArtifactPatterns::DEFAULT_LOG.to_string(),
        }
    }
}

impl ArtifactsConfig {
    pub fn patterns(&self) -> ArtifactResult<ArtifactPatterns> {
        ArtifactPatterns::new(&self.report_pattern, &self.log_pattern)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_dir: PathBuf,
    /// Most recent builds considered per job
    pub max_builds: usize,
    pub jobs: Vec<JobConfig>,
    pub store: StoreConfig,
    pub artifacts: ArtifactsConfig,
    pub signature: SignatureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            max_builds: 5,
            jobs: Vec::new(),
            store: StoreConfig::default(),
            artifacts: ArtifactsConfig::default(),
            signature: SignatureConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Jobs restricted to the given names; all jobs when `names` is empty
    pub fn select_jobs(&self, names: &[String]) -> Vec<JobConfig> {
        self.jobs
            .iter()
            .filter(|job| names.is_empty() || names.contains(&job.name))
            .cloned()
            .collect()
    }
}
