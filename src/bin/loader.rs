//! Bulk loader binary entry point.
//!
//! Reads paper records with precomputed vectors, writes them into Redis and
//! creates the vector search index. Connection settings come from the
//! environment (a `.env` file is read first when present).
//!
//! # Examples
//!
//! Load with the default HNSW index:
//! ```bash
//! loader --input data/arxiv_embeddings.jsonl
//! ```
//!
//! Build an exact flat index instead:
//! ```bash
//! loader --input data/arxiv_embeddings.jsonl --index-type flat
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use paper_qa::{
    config::AppConfig,
    ingestion::{BulkLoader, LoadStats, LoaderConfig, WRITE_CONCURRENCY},
    provider::{json::JsonFilePaperProvider, PaperProvider},
    storage::{redis::RedisStore, IndexType},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Index structure to build
#[derive(Debug, Clone, Copy, ValueEnum)]
enum IndexTypeArg {
    /// Exact brute-force index with L2 distance
    Flat,
    /// Approximate graph index with inner-product distance
    Hnsw,
}

impl From<IndexTypeArg> for IndexType {
    fn from(arg: IndexTypeArg) -> Self {
        match arg {
            IndexTypeArg::Flat => IndexType::Flat,
            IndexTypeArg::Hnsw => IndexType::Hnsw,
        }
    }
}

/// Load arXiv papers and their vectors into Redis
#[derive(Parser, Debug)]
#[command(
    name = "loader",
    version,
    about = "Load paper vectors into Redis and build the search index",
    long_about = "Writes every paper record as a Redis hash and creates one vector search index over them.
Loading is skipped when the database already holds more than a few hundred keys.

EXAMPLES:
  Load a JSON Lines file:
    loader --input data/arxiv_embeddings.jsonl

  Exact flat index, verbose logging:
    loader --input data/arxiv_embeddings.jsonl --index-type flat --log-level debug"
)]
struct LoaderArgs {
    /// Input JSON or JSON Lines file with paper records and vectors
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Index structure (defaults to REDIS_INDEX_TYPE, then HNSW)
    #[arg(long, value_enum)]
    index_type: Option<IndexTypeArg>,

    /// Load at most this many records
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Maximum number of concurrent writes
    #[arg(long, value_name = "N", default_value_t = WRITE_CONCURRENCY)]
    concurrency: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

fn create_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::hidden();
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} papers")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = LoaderArgs::parse();
    init_logging(&args.log_level).context("Failed to initialize logging")?;

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    info!("Starting paper loader");
    debug!("CLI arguments: {:?}", args);
    let start_time = Instant::now();

    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        anyhow::bail!("Input file not found: {:?}", args.input);
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let mut loader_config = LoaderConfig::from_app(&config);
    if let Some(index_type) = args.index_type {
        loader_config.index_type = index_type.into();
    }
    loader_config.concurrency = args.concurrency;
    info!(
        "Target index {:?} ({}) on {}:{}",
        loader_config.index_name, loader_config.index_type, config.redis.host, config.redis.port
    );

    let store = RedisStore::connect(&config.redis)
        .await
        .context("Failed to connect to Redis")?;

    let progress = create_progress_bar()?;
    let ticker = progress.clone();
    let loader = BulkLoader::new(Arc::new(store), loader_config)
        .with_progress(Arc::new(move |n: usize| ticker.inc(n as u64)));

    if let Some(stats) = loader.already_loaded().await.context("Failed to count keys")? {
        print_summary(&stats, start_time.elapsed());
        info!("Store already populated, input not read");
        return Ok(());
    }

    info!("Reading papers from {:?}...", args.input);
    let provider = JsonFilePaperProvider::from_file(&args.input)
        .await
        .with_context(|| format!("Failed to load papers from {:?}", args.input))?;
    let paper_count = provider.count_papers().await?;
    info!("Found {} papers from {}", paper_count, provider.name());

    if paper_count == 0 {
        warn!("No papers found in input file");
        return Ok(());
    }

    let total = args.limit.map_or(paper_count, |limit| limit.min(paper_count));
    progress.set_length(total as u64);
    progress.set_draw_target(ProgressDrawTarget::stderr());

    let stats = match args.limit {
        Some(limit) => {
            let records = provider.fetch_papers_limit(limit).await?;
            loader.load(records).await
        }
        None => loader.load_from_provider(&provider).await,
    }
    .context("Failed to load papers")?;
    progress.finish_and_clear();

    print_summary(&stats, start_time.elapsed());

    if stats.skipped {
        info!("Store already populated, nothing written");
    } else {
        info!("Loading completed successfully");
    }

    Ok(())
}

fn print_summary(stats: &LoadStats, elapsed: Duration) {
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Load Completed                    ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Entries before load:  {:>16} ║", stats.existing_entries);
    println!("║ Skipped:              {:>16} ║", stats.skipped);
    println!("║ Written:              {:>16} ║", stats.written);
    println!("║ Index created:        {:>16} ║", stats.index_created);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");
}
