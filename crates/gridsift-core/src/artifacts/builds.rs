//! Build discovery, listing and status resolution

use super::{ArtifactClient, ArtifactError, ArtifactResult};
use crate::store::StoreError;
use crate::store::browser::{list_directories, list_files};
use crate::{Build, BuildMeta, BuildResult, BuildStatus};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use tracing::debug;

pub const STARTED_MANIFEST: &str = "started.json";
pub const FINISHED_MANIFEST: &str = "finished.json";

/// Contents of `started.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartedManifest {
    #[serde(default)]
    pub timestamp: i64,
}

/// Contents of `finished.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinishedManifest {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub result: String,
}

/// Split `bucket/path/to/job` into `("bucket", "path/to/job/")`
///
/// A bare bucket name selects the whole bucket (empty prefix).
pub fn split_bucket_prefix(job: &str, bucket_prefix: &str) -> ArtifactResult<(String, String)> {
    let invalid = || ArtifactError::InvalidPrefix {
        job: job.to_string(),
        prefix: bucket_prefix.to_string(),
    };

    let mut trimmed = bucket_prefix
        .strip_prefix("gs://")
        .unwrap_or(bucket_prefix)
        .to_string();
    if !trimmed.ends_with('/') {
        trimmed.push('/');
    }
    let (bucket, prefix) = trimmed.split_once('/').ok_or_else(invalid)?;
    if bucket.is_empty() {
        return Err(invalid());
    }
    Ok((bucket.to_string(), prefix.to_string()))
}

impl ArtifactClient {
    /// Discover the builds of a job, in store listing order
    pub async fn find_builds(&self, job: &str, bucket_prefix: &str) -> ArtifactResult<Vec<Build>> {
        let (bucket, prefix) = split_bucket_prefix(job, bucket_prefix)?;
        debug!("Searching for {} builds (gs://{}/{})...", job, bucket, prefix);

        let dirs = list_directories(self.store(), &bucket, &prefix).await?;

        let mut builds = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let build_id = dir[prefix.len()..].trim_end_matches('/');
            if build_id.is_empty() {
                return Err(StoreError::ContractViolation(format!(
                    "empty build directory {:?} under gs://{}/{}",
                    dir, bucket, prefix
                ))
                .into());
            }
            builds.push(Build {
                job: job.to_string(),
                build_id: build_id.to_string(),
                bucket: bucket.clone(),
                prefix: dir.clone(),
            });
        }
        Ok(builds)
    }

    /// List every file of a build
    pub async fn build_meta(&self, build: &Build) -> ArtifactResult<BuildMeta> {
        debug!("Listing gs://{}/{}...", build.bucket, build.prefix);
        let files = list_files(self.store(), &build.bucket, &build.prefix).await?;

        Ok(BuildMeta {
            build: build.clone(),
            files: files.into_iter().collect::<BTreeSet<_>>(),
        })
    }

    /// Resolve the status of a build
    ///
    /// Returns `None` while the build has no `finished.json`, which means it is
    /// still running and should be looked at again on a later run.
    pub async fn build_status(&self, meta: &BuildMeta) -> ArtifactResult<Option<BuildStatus>> {
        let build = &meta.build;
        if !meta.contains(&build.object(FINISHED_MANIFEST)) {
            return Ok(None);
        }

        let started: StartedManifest = self.read_manifest(build, STARTED_MANIFEST).await?;
        let finished: FinishedManifest = self.read_manifest(build, FINISHED_MANIFEST).await?;

        Ok(Some(BuildStatus {
            started_at: started.timestamp,
            finished_at: finished.timestamp,
            result: BuildResult::from(finished.result.as_str()),
        }))
    }

    async fn read_manifest<T: DeserializeOwned>(&self, build: &Build, name: &str) -> ArtifactResult<T> {
        let object = build.object(name);
        let data = self.cache().fetch(&build.bucket, &object).await?;
        serde_json::from_slice(&data).map_err(|source| ArtifactError::MalformedManifest {
            bucket: build.bucket.clone(),
            object,
            source,
        })
    }
}
