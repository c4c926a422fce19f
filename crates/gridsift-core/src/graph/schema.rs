//! FalkorDB schema definitions
//!
//! Defines the node labels holding cached listings, build statuses and test
//! results.

use super::{GraphError, GraphResult};
use crate::TestStatus;
use falkordb::{AsyncGraph, FalkorClientBuilder, FalkorConnectionInfo, FalkorValue};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cached file listing of a build
pub const BUILD_ARTIFACTS: &str = "BuildArtifacts";
/// Status of a fully processed build
pub const BUILD_STATUS: &str = "BuildStatus";
/// One attempt of one test
pub const TEST_RESULT: &str = "TestResult";

/// Graph schema for the test-result index
pub struct GraphSchema {
    graph: Arc<Mutex<AsyncGraph>>,
    graph_name: String,
}

impl GraphSchema {
    /// Connect to FalkorDB and create/get the graph
    pub async fn connect(
        connection_uri: Option<&str>,
        graph_name: &str,
    ) -> GraphResult<Self> {
        let uri = connection_uri.unwrap_or("redis://localhost:6379");

        let connection_info: FalkorConnectionInfo = uri
            .try_into()
            .map_err(|e: falkordb::FalkorDBError| GraphError::Connection(e.to_string()))?;

        let client = FalkorClientBuilder::new_async()
            .with_connection_info(connection_info)
            .build()
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = client.select_graph(graph_name);

        Ok(Self {
            graph: Arc::new(Mutex::new(graph)),
            graph_name: graph_name.to_string(),
        })
    }

    /// Initialize the schema (create indexes)
    pub async fn initialize(&self) -> GraphResult<()> {
        let mut graph = self.graph.lock().await;

        // FalkorDB errors on indexes that already exist, so failures are ignored
        let index_queries = [
            "CREATE INDEX FOR (a:BuildArtifacts) ON (a.job, a.build_id)",
            "CREATE INDEX FOR (s:BuildStatus) ON (s.job, s.build_id)",
            "CREATE INDEX FOR (t:TestResult) ON (t.job, t.build_id, t.test, t.attempt)",
            "CREATE INDEX FOR (t:TestResult) ON (t.signature_hash)",
            "CREATE INDEX FOR (t:TestResult) ON (t.status)",
        ];

        for query in &index_queries {
            let _ = graph.query(query).execute().await;
        }

        Ok(())
    }

    /// Drop all data from the graph
    pub async fn clear(&self) -> GraphResult<()> {
        let mut graph = self.graph.lock().await;
        graph
            .query("MATCH (n) DETACH DELETE n")
            .execute()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;
        Ok(())
    }

    /// Get index statistics
    pub async fn stats(&self) -> GraphResult<GraphStats> {
        let mut graph = self.graph.lock().await;

        async fn get_count(graph: &mut AsyncGraph, query: &str) -> i64 {
            match graph.query(query).execute().await {
                Ok(result) => result
                    .data
                    .into_iter()
                    .next()
                    .and_then(|row| row.into_iter().next())
                    .and_then(|val| match val {
                        FalkorValue::I64(n) => Some(n),
                        _ => None,
                    })
                    .unwrap_or(0),
                Err(_) => 0,
            }
        }

        let listings = get_count(&mut graph, "MATCH (a:BuildArtifacts) RETURN count(a)").await;
        let builds = get_count(&mut graph, "MATCH (s:BuildStatus) RETURN count(s)").await;
        let jobs = get_count(&mut graph, "MATCH (s:BuildStatus) RETURN count(DISTINCT s.job)").await;
        let results = get_count(&mut graph, "MATCH (t:TestResult) RETURN count(t)").await;

        let mut results_by_status = Vec::with_capacity(TestStatus::ALL.len());
        for status in TestStatus::ALL {
            let query = format!(
                "MATCH (t:TestResult) WHERE t.status = {} RETURN count(t)",
                status.code()
            );
            let count = get_count(&mut graph, &query).await;
            results_by_status.push((status, count as usize));
        }

        Ok(GraphStats {
            jobs: jobs as usize,
            builds_indexed: builds as usize,
            listings_cached: listings as usize,
            test_results: results as usize,
            results_by_status,
        })
    }

    /// Execute a raw Cypher query
    pub async fn query(&self, cypher: &str) -> GraphResult<Vec<Vec<FalkorValue>>> {
        let mut graph = self.graph.lock().await;

        let result = graph
            .query(cypher)
            .execute()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let rows: Vec<Vec<FalkorValue>> = result.data.collect();
        Ok(rows)
    }

    /// Get the underlying graph handle
    pub fn graph(&self) -> Arc<Mutex<AsyncGraph>> {
        self.graph.clone()
    }

    /// Get the graph name
    pub fn name(&self) -> &str {
        &self.graph_name
    }
}

/// Escape a string for use in a Cypher query
pub(crate) fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Index statistics
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub jobs: usize,
    pub builds_indexed: usize,
    pub listings_cached: usize,
    pub test_results: usize,
    pub results_by_status: Vec<(TestStatus, usize)>,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Index Statistics:")?;
        writeln!(f, "  Jobs:            {}", self.jobs)?;
        writeln!(f, "  Builds indexed:  {}", self.builds_indexed)?;
        writeln!(f, "  Listings cached: {}", self.listings_cached)?;
        writeln!(f, "  Test results:    {}", self.test_results)?;
        for (status, count) in &self.results_by_status {
            writeln!(f, "    {:<9} {}", status.name(), count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("it's"), "it\\'s");
        assert_eq!(escape_string("a\\b"), "a\\\\b");
        assert_eq!(escape_string("l1\nl2\tx\r"), "l1\\nl2\\tx\\r");
    }

    #[test]
    fn test_stats_display() {
        let stats = GraphStats {
            jobs: 1,
            builds_indexed: 2,
            listings_cached: 3,
            test_results: 4,
            results_by_status: vec![(TestStatus::Flake, 4)],
        };
        let text = stats.to_string();
        assert!(text.contains("Builds indexed:  2"));
        assert!(text.contains("Flake     4"));
    }
}
