//! Build logs as informational test results

use super::{ArtifactClient, ArtifactResult};
use crate::{BuildMeta, TestResult, TestStatus, sanitize_text};
use tracing::debug;

impl ArtifactClient {
    /// Turn every build log of a build into one `Info` result
    ///
    /// The result is named after the log's path relative to the build prefix
    /// and carries the whole log as output.
    pub async fn build_logs(&self, meta: &BuildMeta) -> ArtifactResult<Vec<TestResult>> {
        let build = &meta.build;
        let mut results = Vec::new();

        for object in meta.files.iter().filter(|f| self.patterns().log.is_match(f)) {
            let content = self.cache().fetch(&build.bucket, object).await?;
            debug!("Collected {} bytes of {}", content.len(), object);

            let test = object.strip_prefix(build.prefix.as_str()).unwrap_or(object);
            results.push(TestResult::new(test, TestStatus::Info, sanitize_text(&content)));
        }
        Ok(results)
    }
}
