//! Gridsift CLI - CI test-result indexer
//!
//! Ingests JUnit reports and build logs from a CI artifact bucket into a
//! queryable graph of test attempts and failure signatures.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gridsift")]
#[command(about = "Index CI test results and failure signatures into a graph")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// FalkorDB connection URI (default: redis://localhost:6379)
    #[arg(long, global = true, env = "GRIDSIFT_DB_URI")]
    db_uri: Option<String>,

    /// Graph name (default: gridsift)
    #[arg(long, global = true, default_value = "gridsift")]
    graph: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the builds of every configured job that are not indexed yet
    Index {
        /// Configuration file
        #[arg(short, long, default_value = "gridsift.toml")]
        config: PathBuf,

        /// Number of threads parsing reports
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Download cache directory (overrides the config file)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Most recent builds considered per job (overrides the config file)
        #[arg(long)]
        max_builds: Option<usize>,

        /// Only index the named job (repeatable)
        #[arg(long = "job")]
        only: Vec<String>,

        /// Show what would be indexed without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Show index status and statistics
    Status {
        /// Show the list of indexed builds
        #[arg(long)]
        builds: bool,
    },

    /// Print the failure signature of a local file
    Signature {
        /// File to read ("-" for stdin)
        file: PathBuf,

        /// Configuration file providing the signature patterns
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Index {
            config,
            jobs,
            cache_dir,
            max_builds,
            only,
            dry_run,
        } => {
            let options = commands::index::IndexOptions {
                threads: jobs,
                cache_dir,
                max_builds,
                only,
                dry_run,
            };
            commands::index::run(&config, options, cli.db_uri.as_deref(), &cli.graph).await
        }
        Commands::Status { builds } => {
            commands::status::run(builds, cli.db_uri.as_deref(), &cli.graph).await
        }
        Commands::Signature { file, config } => {
            commands::signature::run(&file, config.as_deref())
        }
    };

    if let Err(ref e) = result {
        tracing::error!("{:#}", e);
    }
    result
}
