//! FalkorDB-backed index store

use super::schema::{BUILD_ARTIFACTS, BUILD_STATUS, TEST_RESULT, escape_string};
use super::{GraphError, GraphResult, GraphSchema, IndexStore};
use crate::{Build, BuildMeta, BuildResult, BuildStatus, ReconciledAttempt};
use async_trait::async_trait;
use falkordb::FalkorValue;
use std::collections::BTreeSet;

/// Writes listings, statuses and test rows to the graph database
///
/// Every write is a `MERGE` on the table key followed by `ON CREATE SET`, so
/// writing an existing key leaves the stored node untouched.
pub struct GraphWriter {
    schema: GraphSchema,
}

impl GraphWriter {
    pub fn new(schema: GraphSchema) -> Self {
        Self { schema }
    }

    /// Get the schema for direct operations
    pub fn schema(&self) -> &GraphSchema {
        &self.schema
    }

    async fn execute(&self, query: &str) -> GraphResult<()> {
        let graph = self.schema.graph();
        let mut graph = graph.lock().await;
        graph
            .query(query)
            .execute()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;
        Ok(())
    }

    async fn first_row(&self, query: &str) -> GraphResult<Option<Vec<FalkorValue>>> {
        let graph = self.schema.graph();
        let mut graph = graph.lock().await;
        let result = graph
            .query(query)
            .execute()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;
        Ok(result.data.into_iter().next())
    }
}

#[async_trait]
impl IndexStore for GraphWriter {
    async fn load_build_meta(&self, build: &Build) -> GraphResult<Option<BuildMeta>> {
        let query = format!(
            "MATCH (a:{label} {{job: '{job}', build_id: '{build_id}'}}) RETURN a.files LIMIT 1",
            label = BUILD_ARTIFACTS,
            job = escape_string(&build.job),
            build_id = escape_string(&build.build_id),
        );

        let Some(row) = self.first_row(&query).await? else {
            return Ok(None);
        };
        let files_json = string_at(&row, 0)?;
        let files: BTreeSet<String> = serde_json::from_str(&files_json)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        Ok(Some(BuildMeta {
            build: build.clone(),
            files,
        }))
    }

    async fn save_build_meta(&self, meta: &BuildMeta) -> GraphResult<()> {
        let files_json = serde_json::to_string(&meta.files)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        let query = format!(
            r#"
            MERGE (a:{label} {{job: '{job}', build_id: '{build_id}'}})
            ON CREATE SET a.bucket = '{bucket}',
                a.prefix = '{prefix}',
                a.files = '{files}'
            "#,
            label = BUILD_ARTIFACTS,
            job = escape_string(&meta.build.job),
            build_id = escape_string(&meta.build.build_id),
            bucket = escape_string(&meta.build.bucket),
            prefix = escape_string(&meta.build.prefix),
            files = escape_string(&files_json),
        );
        self.execute(&query).await
    }

    async fn load_build_status(&self, build: &Build) -> GraphResult<Option<BuildStatus>> {
        let query = format!(
            "MATCH (s:{label} {{job: '{job}', build_id: '{build_id}'}}) \
             RETURN s.started_at, s.finished_at, s.result LIMIT 1",
            label = BUILD_STATUS,
            job = escape_string(&build.job),
            build_id = escape_string(&build.build_id),
        );

        let Some(row) = self.first_row(&query).await? else {
            return Ok(None);
        };
        Ok(Some(BuildStatus {
            started_at: int_at(&row, 0)?,
            finished_at: int_at(&row, 1)?,
            result: BuildResult::from(string_at(&row, 2)?.as_str()),
        }))
    }

    async fn save_build_status(&self, build: &Build, status: &BuildStatus) -> GraphResult<()> {
        let query = format!(
            r#"
            MERGE (s:{label} {{job: '{job}', build_id: '{build_id}'}})
            ON CREATE SET s.started_at = {started_at},
                s.finished_at = {finished_at},
                s.result = '{result}'
            "#,
            label = BUILD_STATUS,
            job = escape_string(&build.job),
            build_id = escape_string(&build.build_id),
            started_at = status.started_at,
            finished_at = status.finished_at,
            result = escape_string(status.result.as_str()),
        );
        self.execute(&query).await
    }

    async fn save_test_result(&self, row: &ReconciledAttempt) -> GraphResult<()> {
        let query = format!(
            r#"
            MERGE (t:{label} {{job: '{job}', build_id: '{build_id}', test: '{test}', attempt: {attempt}}})
            ON CREATE SET t.finished_at = {finished_at},
                t.attempts = {attempts},
                t.status = {status},
                t.output = '{output}',
                t.signature = '{signature}',
                t.signature_hash = '{signature_hash}'
            "#,
            label = TEST_RESULT,
            job = escape_string(&row.job),
            build_id = escape_string(&row.build_id),
            test = escape_string(&row.test),
            attempt = row.attempt,
            finished_at = row.finished_at,
            attempts = row.attempts,
            status = row.status.code(),
            output = escape_string(&row.output),
            signature = escape_string(&row.signature),
            signature_hash = escape_string(&row.signature_hash),
        );
        self.execute(&query).await
    }
}

fn string_at(row: &[FalkorValue], i: usize) -> GraphResult<String> {
    match row.get(i) {
        Some(FalkorValue::String(s)) => Ok(s.clone()),
        other => Err(GraphError::Schema(format!(
            "expected string in column {}, got {:?}",
            i, other
        ))),
    }
}

fn int_at(row: &[FalkorValue], i: usize) -> GraphResult<i64> {
    match row.get(i) {
        Some(FalkorValue::I64(n)) => Ok(*n),
        other => Err(GraphError::Schema(format!(
            "expected integer in column {}, got {:?}",
            i, other
        ))),
    }
}
