//! Incremental indexing of CI builds
//!
//! Only processes builds whose status has not been persisted yet. A build's
//! status is written after all of its rows, so a build interrupted halfway is
//! picked up again on the next run.

use super::{IndexResult, IndexingStats};
use crate::Build;
use crate::artifacts::ArtifactClient;
use crate::config::JobConfig;
use crate::graph::IndexStore;
use crate::reconcile::reconcile;
use crate::signature::SignatureGenerator;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for incremental indexing
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Most recent builds considered per job
    pub max_builds: usize,
    /// Dry run (don't write to database)
    pub dry_run: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_builds: 5,
            dry_run: false,
        }
    }
}

/// Where a build ended up after one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildOutcome {
    /// Status already persisted
    Done,
    /// No finish marker yet
    Pending,
    /// Processed, with the number of rows written
    Indexed(usize),
}

/// Incremental indexer that only processes unfinished builds
pub struct IncrementalIndexer<S> {
    client: ArtifactClient,
    store: S,
    signatures: SignatureGenerator,
    config: IndexerConfig,
}

impl<S: IndexStore> IncrementalIndexer<S> {
    pub fn new(
        client: ArtifactClient,
        store: S,
        signatures: SignatureGenerator,
        config: IndexerConfig,
    ) -> Self {
        Self {
            client,
            store,
            signatures,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run incremental indexing over the given jobs
    ///
    /// Stops at the first error; builds finished before it stay persisted.
    pub async fn run(&self, jobs: &[JobConfig]) -> IndexResult<IndexingStats> {
        let start = Instant::now();
        let mut stats = IndexingStats::default();

        if self.config.dry_run {
            println!("Dry run - not writing to database");
        }

        for job in jobs {
            stats.jobs += 1;

            let mut builds = self.client.find_builds(&job.name, &job.prefix).await?;
            if builds.len() > self.config.max_builds {
                builds.drain(..builds.len() - self.config.max_builds);
            }
            stats.builds_discovered += builds.len();

            println!("{}: {} builds", job.name, builds.len());

            for build in &builds {
                match self.index_build(build).await? {
                    BuildOutcome::Done => {
                        debug!("{} already indexed", build);
                        stats.builds_done += 1;
                    }
                    BuildOutcome::Pending => {
                        warn!("{} has not finished yet", build);
                        println!("  {} pending", build.build_id);
                        stats.builds_pending += 1;
                    }
                    BuildOutcome::Indexed(rows) => {
                        if self.config.dry_run {
                            println!("  {} would be indexed", build.build_id);
                        } else {
                            println!("  {} indexed ({} rows)", build.build_id, rows);
                        }
                        stats.builds_indexed += 1;
                        stats.rows_written += rows;
                    }
                }
            }
        }

        stats.duration = start.elapsed();
        println!("\nIndexing complete in {:.2?}", stats.duration);

        Ok(stats)
    }

    /// Take one build as far as it can go in this run
    async fn index_build(&self, build: &Build) -> IndexResult<BuildOutcome> {
        if self.store.load_build_status(build).await?.is_some() {
            return Ok(BuildOutcome::Done);
        }

        let (meta, meta_cached) = match self.store.load_build_meta(build).await? {
            Some(meta) => (meta, true),
            None => (self.client.build_meta(build).await?, false),
        };
        debug!(
            "{}: {} files (listing {})",
            build,
            meta.files.len(),
            if meta_cached { "cached" } else { "fetched" }
        );

        let Some(status) = self.client.build_status(&meta).await? else {
            return Ok(BuildOutcome::Pending);
        };

        if self.config.dry_run {
            return Ok(BuildOutcome::Indexed(0));
        }

        if !meta_cached {
            self.store.save_build_meta(&meta).await?;
        }

        let mut results = self.client.test_results(&meta).await?;
        results.extend(self.client.build_logs(&meta).await?);

        let rows = reconcile(results).into_rows(build, &status, &self.signatures);
        for row in &rows {
            self.store.save_test_result(row).await?;
        }

        self.store.save_build_status(build, &status).await?;
        info!("{}: {} ({} rows)", build, status.result, rows.len());

        Ok(BuildOutcome::Indexed(rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactConfig, ArtifactError};
    use crate::graph::{GraphError, GraphResult, MemoryIndexStore};
    use crate::index::IndexError;
    use crate::store::MemoryStore;
    use crate::{BuildMeta, BuildResult, BuildStatus, ReconciledAttempt, TestStatus};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    const BUCKET: &str = "ci";

    struct Fixture {
        _cache: TempDir,
        objects: MemoryStore,
        index: MemoryIndexStore,
        indexer: IncrementalIndexer<MemoryIndexStore>,
    }

    fn fixture(config: IndexerConfig) -> Fixture {
        let cache = TempDir::new().unwrap();
        let objects = MemoryStore::new();
        let index = MemoryIndexStore::new();
        let client = ArtifactClient::new(
            Arc::new(objects.clone()),
            ArtifactConfig {
                cache_dir: cache.path().to_path_buf(),
                threads: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let indexer =
            IncrementalIndexer::new(client, index.clone(), SignatureGenerator::default(), config);
        Fixture {
            _cache: cache,
            objects,
            index,
            indexer,
        }
    }

    fn jobs() -> Vec<JobConfig> {
        vec![JobConfig {
            name: "e2e".to_string(),
            prefix: format!("{}/logs/e2e", BUCKET),
        }]
    }

    fn put(objects: &MemoryStore, build_id: &str, name: &str, data: &str) {
        objects.insert(BUCKET, &format!("logs/e2e/{}/{}", build_id, name), data);
    }

    fn finish(objects: &MemoryStore, build_id: &str) {
        put(objects, build_id, "started.json", r#"{"timestamp": 100}"#);
        put(
            objects,
            build_id,
            "finished.json",
            r#"{"timestamp": 200, "result": "FAILURE"}"#,
        );
    }

    fn flaky_build(objects: &MemoryStore, build_id: &str) {
        put(
            objects,
            build_id,
            "artifacts/junit_01.xml",
            r#"<testsuites><testsuite name="e2e">
                <testcase name="flaky"><failure message="error: timed out after 30s"/></testcase>
                <testcase name="stable"/>
            </testsuite></testsuites>"#,
        );
        put(
            objects,
            build_id,
            "artifacts/junit_02.xml",
            r#"<testsuite name="retry"><testcase name="flaky"/></testsuite>"#,
        );
        put(objects, build_id, "build-log.txt", "step 1\nERROR: pod e2e-abc12 failed\n");
        finish(objects, build_id);
    }

    #[tokio::test]
    async fn test_indexes_finished_build() {
        let f = fixture(IndexerConfig::default());
        flaky_build(&f.objects, "1");

        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.jobs, 1);
        assert_eq!(stats.builds_discovered, 1);
        assert_eq!(stats.builds_indexed, 1);
        assert_eq!(stats.rows_written, 4);

        let rows = f.index.rows();
        let flaky: Vec<_> = rows.iter().filter(|r| r.test == "flaky").collect();
        assert_eq!(flaky.len(), 2);
        assert_eq!((flaky[0].attempt, flaky[0].status), (-1, TestStatus::Flake));
        assert_eq!((flaky[1].attempt, flaky[1].status), (0, TestStatus::Success));
        assert_eq!(flaky[0].output, "error: timed out after 30s");
        assert_eq!(flaky[0].signature, "error: timed out after 0s");
        assert!(flaky.iter().all(|r| r.attempts == 2 && r.finished_at == 200));

        let log = rows.iter().find(|r| r.test == "build-log.txt").unwrap();
        assert_eq!(log.status, TestStatus::Info);
        assert_eq!(log.signature, "ERROR: pod e0e-RANDOM failed");

        let status = f.index.status("e2e", "1").unwrap();
        assert_eq!(status.started_at, 100);
        assert_eq!(status.result, BuildResult::Failure);
        assert!(f.index.has_meta("e2e", "1"));
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let f = fixture(IndexerConfig::default());
        flaky_build(&f.objects, "1");

        f.indexer.run(&jobs()).await.unwrap();
        let writes = f.index.writes();
        let reads = f.objects.reads();

        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.builds_done, 1);
        assert_eq!(stats.builds_indexed, 0);
        assert_eq!(stats.rows_written, 0);
        assert_eq!(f.index.writes(), writes);
        assert_eq!(f.objects.reads(), reads);
    }

    #[tokio::test]
    async fn test_unfinished_build_is_retried() {
        let f = fixture(IndexerConfig::default());
        put(&f.objects, "1", "started.json", r#"{"timestamp": 100}"#);
        put(&f.objects, "1", "artifacts/junit.xml", r#"<testsuite><testcase name="a"/></testsuite>"#);

        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.builds_pending, 1);
        assert_eq!(f.index.writes(), 0);
        assert!(!f.index.has_meta("e2e", "1"));

        put(
            &f.objects,
            "1",
            "finished.json",
            r#"{"timestamp": 300, "result": "SUCCESS"}"#,
        );
        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.builds_pending, 0);
        assert_eq!(stats.builds_indexed, 1);
        assert_eq!(f.index.row_count(), 1);
        assert_eq!(f.index.status("e2e", "1").unwrap().finished_at, 300);
    }

    #[tokio::test]
    async fn test_keeps_most_recent_builds() {
        let f = fixture(IndexerConfig {
            max_builds: 2,
            dry_run: false,
        });
        for id in ["100", "101", "102"] {
            finish(&f.objects, id);
        }

        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.builds_discovered, 2);
        assert!(f.index.status("e2e", "100").is_none());
        assert!(f.index.status("e2e", "101").is_some());
        assert!(f.index.status("e2e", "102").is_some());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let f = fixture(IndexerConfig {
            dry_run: true,
            ..Default::default()
        });
        flaky_build(&f.objects, "1");
        put(&f.objects, "2", "started.json", r#"{"timestamp": 100}"#);

        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.builds_indexed, 1);
        assert_eq!(stats.builds_pending, 1);
        assert_eq!(stats.rows_written, 0);
        assert_eq!(f.index.writes(), 0);
    }

    #[tokio::test]
    async fn test_malformed_report_aborts_run() {
        let f = fixture(IndexerConfig::default());
        put(&f.objects, "1", "artifacts/junit.xml", "<html>not a report</html>");
        finish(&f.objects, "1");
        flaky_build(&f.objects, "2");

        let err = f.indexer.run(&jobs()).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::Artifact(ArtifactError::MalformedReport { .. })
        ));
        assert!(f.index.status("e2e", "1").is_none());
        assert!(f.index.status("e2e", "2").is_none());
    }

    /// Index store that rejects the n-th test row while armed
    #[derive(Clone)]
    struct FailingRows {
        inner: MemoryIndexStore,
        fail_at: usize,
        seen: Arc<AtomicUsize>,
        armed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl IndexStore for FailingRows {
        async fn load_build_meta(&self, build: &Build) -> GraphResult<Option<BuildMeta>> {
            self.inner.load_build_meta(build).await
        }

        async fn save_build_meta(&self, meta: &BuildMeta) -> GraphResult<()> {
            self.inner.save_build_meta(meta).await
        }

        async fn load_build_status(&self, build: &Build) -> GraphResult<Option<BuildStatus>> {
            self.inner.load_build_status(build).await
        }

        async fn save_build_status(&self, build: &Build, status: &BuildStatus) -> GraphResult<()> {
            self.inner.save_build_status(build, status).await
        }

        async fn save_test_result(&self, row: &ReconciledAttempt) -> GraphResult<()> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if self.armed.load(Ordering::SeqCst) && n == self.fail_at {
                return Err(GraphError::Query("connection reset".to_string()));
            }
            self.inner.save_test_result(row).await
        }
    }

    #[tokio::test]
    async fn test_interrupted_build_is_redone() {
        let cache = TempDir::new().unwrap();
        let objects = MemoryStore::new();
        flaky_build(&objects, "1");
        let index = MemoryIndexStore::new();
        let store = FailingRows {
            inner: index.clone(),
            fail_at: 2,
            seen: Arc::new(AtomicUsize::new(0)),
            armed: Arc::new(AtomicBool::new(true)),
        };
        let client = ArtifactClient::new(
            Arc::new(objects.clone()),
            ArtifactConfig {
                cache_dir: cache.path().to_path_buf(),
                threads: 1,
                ..Default::default()
            },
        )
        .unwrap();
        let indexer = IncrementalIndexer::new(
            client,
            store.clone(),
            SignatureGenerator::default(),
            IndexerConfig::default(),
        );

        let err = indexer.run(&jobs()).await.unwrap_err();
        assert!(matches!(err, IndexError::Graph(GraphError::Query(_))));
        assert!(index.status("e2e", "1").is_none());
        assert_eq!(index.row_count(), 1);

        store.armed.store(false, Ordering::SeqCst);
        let stats = indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.builds_indexed, 1);
        assert_eq!(index.row_count(), 4);
        assert_eq!(index.status("e2e", "1").unwrap().finished_at, 200);
    }

    #[tokio::test]
    async fn test_empty_job() {
        let f = fixture(IndexerConfig::default());
        let stats = f.indexer.run(&jobs()).await.unwrap();
        assert_eq!(stats.jobs, 1);
        assert_eq!(stats.builds_discovered, 0);
    }
}
