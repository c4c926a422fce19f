//! In-process index store

use super::{GraphResult, IndexStore};
use crate::{Build, BuildMeta, BuildStatus, ReconciledAttempt};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

type BuildKey = (String, String);
type RowKey = (String, String, String, i64);

#[derive(Debug, Default)]
struct Tables {
    metas: HashMap<BuildKey, BuildMeta>,
    statuses: HashMap<BuildKey, BuildStatus>,
    rows: BTreeMap<RowKey, ReconciledAttempt>,
    writes: usize,
}

/// Index store kept in memory with the same insert-once semantics as the
/// graph database
#[derive(Debug, Clone, Default)]
pub struct MemoryIndexStore {
    tables: Arc<Mutex<Tables>>,
}

fn build_key(build: &Build) -> BuildKey {
    (build.job.clone(), build.build_id.clone())
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted test rows ordered by key
    pub fn rows(&self) -> Vec<ReconciledAttempt> {
        let tables = self.tables.lock().expect("Mutex poisoned");
        tables.rows.values().cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.tables.lock().expect("Mutex poisoned").rows.len()
    }

    pub fn status(&self, job: &str, build_id: &str) -> Option<BuildStatus> {
        let tables = self.tables.lock().expect("Mutex poisoned");
        tables
            .statuses
            .get(&(job.to_string(), build_id.to_string()))
            .cloned()
    }

    pub fn has_meta(&self, job: &str, build_id: &str) -> bool {
        let tables = self.tables.lock().expect("Mutex poisoned");
        tables
            .metas
            .contains_key(&(job.to_string(), build_id.to_string()))
    }

    /// Number of inserts that created a new entry, across all tables
    pub fn writes(&self) -> usize {
        self.tables.lock().expect("Mutex poisoned").writes
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn load_build_meta(&self, build: &Build) -> GraphResult<Option<BuildMeta>> {
        let tables = self.tables.lock().expect("Mutex poisoned");
        Ok(tables.metas.get(&build_key(build)).map(|meta| BuildMeta {
            build: build.clone(),
            files: meta.files.clone(),
        }))
    }

    async fn save_build_meta(&self, meta: &BuildMeta) -> GraphResult<()> {
        let mut tables = self.tables.lock().expect("Mutex poisoned");
        let key = build_key(&meta.build);
        if !tables.metas.contains_key(&key) {
            tables.metas.insert(key, meta.clone());
            tables.writes += 1;
        }
        Ok(())
    }

    async fn load_build_status(&self, build: &Build) -> GraphResult<Option<BuildStatus>> {
        let tables = self.tables.lock().expect("Mutex poisoned");
        Ok(tables.statuses.get(&build_key(build)).cloned())
    }

    async fn save_build_status(&self, build: &Build, status: &BuildStatus) -> GraphResult<()> {
        let mut tables = self.tables.lock().expect("Mutex poisoned");
        let key = build_key(build);
        if !tables.statuses.contains_key(&key) {
            tables.statuses.insert(key, status.clone());
            tables.writes += 1;
        }
        Ok(())
    }

    async fn save_test_result(&self, row: &ReconciledAttempt) -> GraphResult<()> {
        let mut tables = self.tables.lock().expect("Mutex poisoned");
        let key = (
            row.job.clone(),
            row.build_id.clone(),
            row.test.clone(),
            row.attempt,
        );
        if !tables.rows.contains_key(&key) {
            tables.rows.insert(key, row.clone());
            tables.writes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildResult, TestStatus};

    fn build() -> Build {
        Build {
            job: "job".to_string(),
            build_id: "1".to_string(),
            bucket: "bkt".to_string(),
            prefix: "logs/job/1/".to_string(),
        }
    }

    fn row(attempt: i64, output: &str) -> ReconciledAttempt {
        ReconciledAttempt {
            job: "job".to_string(),
            build_id: "1".to_string(),
            test: "t".to_string(),
            finished_at: 0,
            attempt,
            attempts: 2,
            status: TestStatus::Failure,
            output: output.to_string(),
            signature: String::new(),
            signature_hash: String::new(),
        }
    }

    #[tokio::test]
    async fn test_rows_insert_once() {
        let store = MemoryIndexStore::new();
        store.save_test_result(&row(0, "first")).await.unwrap();
        store.save_test_result(&row(0, "second")).await.unwrap();
        store.save_test_result(&row(-1, "other")).await.unwrap();

        let rows = store.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().find(|r| r.attempt == 0).unwrap().output, "first");
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_status_and_meta() {
        let store = MemoryIndexStore::new();
        let build = build();
        assert!(store.load_build_status(&build).await.unwrap().is_none());
        assert!(store.load_build_meta(&build).await.unwrap().is_none());

        let status = BuildStatus {
            started_at: 1,
            finished_at: 2,
            result: BuildResult::Failure,
        };
        store.save_build_status(&build, &status).await.unwrap();
        store
            .save_build_status(
                &build,
                &BuildStatus {
                    result: BuildResult::Success,
                    ..status.clone()
                },
            )
            .await
            .unwrap();
        assert_eq!(store.load_build_status(&build).await.unwrap(), Some(status));

        let meta = BuildMeta {
            build: build.clone(),
            files: ["logs/job/1/finished.json".to_string()].into_iter().collect(),
        };
        store.save_build_meta(&meta).await.unwrap();
        assert!(store.has_meta("job", "1"));
        assert_eq!(store.load_build_meta(&build).await.unwrap(), Some(meta));
    }
}
