//! Index command implementation

use anyhow::Context;
use gridsift_core::artifacts::{ArtifactClient, ArtifactConfig};
use gridsift_core::config::Config;
use gridsift_core::graph::{GraphSchema, GraphWriter};
use gridsift_core::index::{IncrementalIndexer, IndexerConfig};
use gridsift_core::signature::SignatureGenerator;
use gridsift_core::store::GcsStore;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Command-line overrides of the configuration file
#[derive(Debug, Default)]
pub struct IndexOptions {
    pub threads: Option<usize>,
    pub cache_dir: Option<PathBuf>,
    pub max_builds: Option<usize>,
    pub only: Vec<String>,
    pub dry_run: bool,
}

pub async fn run(
    config_path: &Path,
    options: IndexOptions,
    db_uri: Option<&str>,
    graph_name: &str,
) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(cache_dir) = options.cache_dir {
        config.cache_dir = cache_dir;
    }
    if let Some(max_builds) = options.max_builds {
        config.max_builds = max_builds;
    }

    let jobs = config.select_jobs(&options.only);
    if jobs.is_empty() {
        anyhow::bail!("No jobs to index in {:?}", config_path);
    }

    let store = GcsStore::new(config.store.gcs())?;
    let client = ArtifactClient::new(
        Arc::new(store),
        ArtifactConfig {
            cache_dir: config.cache_dir.clone(),
            patterns: config.artifacts.patterns()?,
            threads: options.threads.unwrap_or_else(num_cpus::get),
        },
    )?;
    let signatures = SignatureGenerator::new(&config.signature)
        .context("invalid signature pattern")?;

    // Connect to database
    print!("Connecting to database...");
    let _ = io::stdout().flush();
    let connect_start = Instant::now();

    let schema = GraphSchema::connect(db_uri, graph_name).await?;
    schema.initialize().await?;

    println!(" connected in {:.2?}", connect_start.elapsed());

    let indexer = IncrementalIndexer::new(
        client,
        GraphWriter::new(schema),
        signatures,
        IndexerConfig {
            max_builds: config.max_builds,
            dry_run: options.dry_run,
        },
    );
    let stats = indexer.run(&jobs).await?;

    println!("\n{}", stats);
    Ok(())
}
