//! Dashboard binary entry point.
//!
//! Connects to Redis, loads the embedding model and serves the question
//! answering dashboard over HTTP.
//!
//! # Examples
//!
//! ```bash
//! QA_READER_URL=http://localhost:8080/qa dashboard --bind 127.0.0.1:8501
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use paper_qa::{
    config::AppConfig,
    document_store::RedisDocumentStore,
    embedding::fastembed::FastEmbedProvider,
    pipeline::{ExtractiveQaPipeline, HttpReader},
    server::{self, AppState},
    storage::redis::RedisStore,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Serve the paper question answering dashboard
#[derive(Parser, Debug)]
#[command(name = "dashboard", version, about = "Ask questions over arXiv abstracts")]
struct Args {
    /// Address to listen on
    #[arg(long, value_name = "ADDR", default_value = "127.0.0.1:8501")]
    bind: SocketAddr,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Query embedding model (overrides EMBEDDING_MODEL). Must match the
    /// model that produced the stored vectors.
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);
    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded environment from {}", path.display());
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let reader_url = config.reader_url().context("No QA reader configured")?;

    let store = RedisStore::connect(&config.redis)
        .await
        .context("Failed to connect to Redis")?;

    let cache_dir = args
        .cache_dir
        .or_else(|| dirs::cache_dir().map(|p| p.join("fastembed")));
    let model = args.model.as_deref().or(config.embedding_model.as_deref());
    let embedder =
        FastEmbedProvider::from_name(model, cache_dir).context("Failed to create FastEmbed provider")?;

    let documents = RedisDocumentStore::new(store, embedder, &config);
    let reader = HttpReader::new(reader_url, config.qa_reader_token.clone());
    let pipeline = ExtractiveQaPipeline::new(
        documents,
        reader,
        config.top_k_retriever,
        config.top_k_reader,
    );
    info!(
        "Pipeline ready: {} documents retrieved, {} answers kept",
        config.top_k_retriever, config.top_k_reader
    );

    server::serve(args.bind, AppState::new(Arc::new(pipeline)))
        .await
        .context("Dashboard server failed")?;

    Ok(())
}
