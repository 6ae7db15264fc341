//! Search binary entry point.
//!
//! Command-line vector search over the paper index. Supports both single-query
//! and interactive REPL modes, with table or JSON output.
//!
//! # Examples
//!
//! Single query with default settings:
//! ```bash
//! search --query "neural networks"
//! ```
//!
//! JSON output with year filter:
//! ```bash
//! search --query "transformers" --format json --year-start 2020
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --interactive
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use paper_qa::{
    config::AppConfig,
    embedding::{fastembed::FastEmbedProvider, vector_to_bytes, EmbeddingProvider},
    presentation::{categories_line, clamp_year_range, MAX_YEAR, MIN_YEAR},
    query::{VectorQuery, SCORE_FIELD},
    storage::{redis::RedisStore, SearchHit, VectorStore},
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search binary CLI for querying the paper index
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search papers in the Redis vector index",
    long_about = "Query the paper index by vector similarity. Supports both single-query \
                  and interactive modes with flexible output formatting.

EXAMPLES:
  Single query:
    search --query \"neural networks\"

  JSON output with year filter:
    search --query \"transformers\" --format json --year-start 2020

  Restrict to categories:
    search --query \"graph coloring\" --category math.CO --category cs.DM

  Interactive mode:
    search --interactive"
)]
struct Args {
    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Number of results to return
    #[arg(long, value_name = "N", default_value = "10")]
    top_k: usize,

    /// Filter papers from this year onwards (inclusive)
    #[arg(long, value_name = "YEAR")]
    year_start: Option<i32>,

    /// Filter papers up to this year (inclusive)
    #[arg(long, value_name = "YEAR")]
    year_end: Option<i32>,

    /// Category code to match (repeatable)
    #[arg(long = "category", value_name = "CODE")]
    categories: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Query embedding model (overrides EMBEDDING_MODEL). Must match the
    /// model that produced the stored vectors.
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,
}

/// One search result as printed.
#[derive(Debug, Clone, Serialize)]
struct PaperHit {
    id: String,
    title: String,
    authors: String,
    year: String,
    categories: String,
    update_date: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
    score: f32,
}

impl From<&SearchHit> for PaperHit {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: hit.text_or_empty("paper_id"),
            title: hit.text_or_empty("title"),
            authors: hit.text_or_empty("authors"),
            year: hit.text_or_empty("year"),
            categories: hit.text_or_empty("categories"),
            update_date: hit.text_or_empty("update_date"),
            abstract_text: hit.text_or_empty("abstract"),
            score: hit
                .text(SCORE_FIELD)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),
        }
    }
}

/// Query parameters adjustable from the REPL.
#[derive(Debug, Clone)]
struct SearchSettings {
    top_k: usize,
    years: Option<(i32, i32)>,
    categories: Vec<String>,
    search_type: String,
    format: OutputFormat,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn build_query(settings: &SearchSettings) -> Result<VectorQuery> {
    let years: Vec<String> = settings
        .years
        .map(|(start, end)| (start..=end).map(|y| y.to_string()).collect())
        .unwrap_or_default();
    Ok(VectorQuery::builder()
        .years(&years)
        .categories(&settings.categories)
        .search_type(&settings.search_type)
        .number_of_results(settings.top_k)
        .build()?)
}

/// Execute a search query and return results
async fn execute_search<E: EmbeddingProvider, S: VectorStore>(
    embedder: &E,
    store: &S,
    index: &str,
    query_text: &str,
    settings: &SearchSettings,
) -> Result<Vec<PaperHit>> {
    debug!("Executing search for query: {}", query_text);

    let vector = embedder
        .embed(query_text)
        .await
        .with_context(|| format!("Failed to embed query: '{}'", query_text))?;

    let query = build_query(settings)?;
    let hits = store
        .search(index, &query, &vector_to_bytes(&vector))
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query_text))?;

    Ok(hits.iter().map(PaperHit::from).collect())
}

/// Format results as a pretty table
fn format_results_table(results: &[PaperHit]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Categories").add_attribute(Attribute::Bold),
        Cell::new("Distance").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(&result.title, 60)),
            Cell::new(&result.year),
            Cell::new(truncate(&categories_line(&result.categories), 40)).fg(Color::Cyan),
            Cell::new(format!("{:.4}", result.score)),
        ]);
    }

    table.to_string()
}

/// Format results as JSON
fn format_results_json(results: &[PaperHit]) -> Result<String> {
    serde_json::to_string_pretty(results).with_context(|| "Failed to serialize results to JSON")
}

fn print_results(results: &[PaperHit], format: OutputFormat, elapsed_secs: f64) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(results));
            println!("\nFound {} results in {:.2}s", results.len(), elapsed_secs);
        }
        OutputFormat::Json => println!("{}", format_results_json(results)?),
    }
    Ok(())
}

/// Display detailed view of a single result
fn display_result_detail(result: &PaperHit, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Title: {}", result.title);
    println!("Authors: {}", result.authors);
    println!("Year: {}", result.year);
    if !result.update_date.is_empty() {
        println!("Updated: {}", result.update_date);
    }
    println!("Categories: {}", categories_line(&result.categories));
    println!("Link: https://arxiv.org/abs/{}", result.id);
    println!("Distance: {:.4}", result.score);
    println!("\nAbstract:\n{}", result.abstract_text.trim());
    println!("{}", "═".repeat(80));
}

const HELP: &str = "Commands:
  <query>           search for papers
  /top N            return N results
  /year START END   only papers from START to END
  /year clear       drop the year filter
  /format FORMAT    table or json
  /detail N         full record of result N
  /help             this help
  Ctrl+D / Ctrl+C   exit";

/// One line of REPL input.
#[derive(Debug, Clone, PartialEq)]
enum ReplCommand {
    Help,
    Top(usize),
    Years(Option<(i32, i32)>),
    Format(OutputFormat),
    Detail(usize),
    Search(String),
}

/// Parse a non-empty, trimmed REPL line. Errors are usage messages.
fn parse_command(line: &str) -> std::result::Result<ReplCommand, String> {
    if !line.starts_with('/') {
        return Ok(ReplCommand::Search(line.to_string()));
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["/help"] => Ok(ReplCommand::Help),
        ["/top", n] => match n.parse::<usize>() {
            Ok(n) if n > 0 => Ok(ReplCommand::Top(n)),
            _ => Err("Invalid number: must be a positive integer".to_string()),
        },
        ["/top", ..] => Err("Usage: /top N".to_string()),
        ["/year", "clear"] => Ok(ReplCommand::Years(None)),
        ["/year", start, end] => match (start.parse::<i32>(), end.parse::<i32>()) {
            (Ok(start), Ok(end)) if start <= end => {
                Ok(ReplCommand::Years(Some(clamp_year_range(start, end))))
            }
            _ => Err("Invalid year range: START must be <= END".to_string()),
        },
        ["/year", ..] => Err("Usage: /year START END  or  /year clear".to_string()),
        ["/format", "table"] => Ok(ReplCommand::Format(OutputFormat::Table)),
        ["/format", "json"] => Ok(ReplCommand::Format(OutputFormat::Json)),
        ["/format", ..] => Err("Usage: /format [table|json]".to_string()),
        ["/detail", n] => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(ReplCommand::Detail)
            .ok_or_else(|| "Invalid rank: must be a positive integer".to_string()),
        ["/detail", ..] => Err("Usage: /detail N".to_string()),
        [other, ..] => Err(format!("Unknown command: {other}. Type /help for available commands.")),
        [] => Err("Empty command".to_string()),
    }
}

/// Run interactive REPL mode
async fn run_interactive<E: EmbeddingProvider, S: VectorStore>(
    embedder: E,
    store: S,
    index: &str,
    mut settings: SearchSettings,
) -> Result<()> {
    println!("Interactive Paper Search");
    println!("{HELP}\n");

    let mut rl = DefaultEditor::new().context("Failed to create readline editor")?;
    let mut last_results: Vec<PaperHit> = Vec::new();

    loop {
        let line = match rl.readline("Search> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line).ok();

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(usage) => {
                eprintln!("{usage}");
                continue;
            }
        };

        match command {
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Top(n) => {
                settings.top_k = n;
                println!("Set top-k to {n}");
            }
            ReplCommand::Years(Some((start, end))) => {
                settings.years = Some((start, end));
                println!("Set year filter: {start} - {end}");
            }
            ReplCommand::Years(None) => {
                settings.years = None;
                println!("Cleared year filter");
            }
            ReplCommand::Format(format) => {
                settings.format = format;
                println!("Set output format to {format:?}");
            }
            ReplCommand::Detail(rank) => match last_results.get(rank - 1) {
                Some(hit) => display_result_detail(hit, rank),
                None => eprintln!(
                    "Rank {rank} out of range (last search had {} results)",
                    last_results.len()
                ),
            },
            ReplCommand::Search(query) => {
                let start = Instant::now();
                match execute_search(&embedder, &store, index, &query, &settings).await {
                    Ok(results) => {
                        if let Err(e) = print_results(&results, settings.format, start.elapsed().as_secs_f64()) {
                            eprintln!("Error formatting results: {e}");
                        }
                        last_results = results;
                    }
                    Err(e) => eprintln!("Search failed: {e:#}"),
                }
            }
        }
    }

    Ok(())
}

/// Year filter from the command line, clamped to the selectable years.
fn year_filter(start: Option<i32>, end: Option<i32>) -> Result<Option<(i32, i32)>> {
    if start.is_none() && end.is_none() {
        return Ok(None);
    }
    let start = start.unwrap_or(MIN_YEAR);
    let end = end.unwrap_or(MAX_YEAR);
    if start > end {
        anyhow::bail!(
            "Invalid year range: start year ({}) cannot be greater than end year ({})",
            start,
            end
        );
    }
    Ok(Some(clamp_year_range(start, end)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);
    dotenvy::dotenv().ok();

    let query = match (&args.query, args.interactive) {
        (Some(query), false) => Some(query.clone()),
        (None, true) => None,
        _ => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
    };

    let years = year_filter(args.year_start, args.year_end)?;
    if args.top_k == 0 {
        anyhow::bail!("--top-k must be a positive integer");
    }

    let config = AppConfig::from_env().context("Invalid configuration")?;
    let store = RedisStore::connect(&config.redis)
        .await
        .context("Failed to connect to Redis")?;

    let entries = store.count_entries().await.context("Failed to count keys")?;
    if entries == 0 {
        anyhow::bail!(
            "Database is empty (0 keys found).\n\
             Please run the loader binary to add papers first."
        );
    }
    info!("Database contains {} keys", entries);

    let cache_dir = args
        .cache_dir
        .clone()
        .or_else(|| dirs::cache_dir().map(|p| p.join("fastembed")));
    let model = args.model.as_deref().or(config.embedding_model.as_deref());
    let embedder =
        FastEmbedProvider::from_name(model, cache_dir).context("Failed to create FastEmbed provider")?;
    info!(
        "Using embedding model: {} (dimension: {})",
        embedder.model_name(),
        embedder.dimension()
    );

    let settings = SearchSettings {
        top_k: args.top_k,
        years,
        categories: args.categories.clone(),
        search_type: config.search_type.clone(),
        format: args.format,
    };

    match query {
        Some(query) => {
            let start = Instant::now();
            let results = execute_search(&embedder, &store, &config.index_name, &query, &settings).await?;
            print_results(&results, settings.format, start.elapsed().as_secs_f64())?;
        }
        None => run_interactive(embedder, store, &config.index_name, settings).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_a_search() {
        assert_eq!(
            parse_command("graph neural networks"),
            Ok(ReplCommand::Search("graph neural networks".to_string()))
        );
    }

    #[test]
    fn test_settings_commands() {
        assert_eq!(parse_command("/top 20"), Ok(ReplCommand::Top(20)));
        assert_eq!(parse_command("/year 2018 2020"), Ok(ReplCommand::Years(Some((2018, 2020)))));
        assert_eq!(parse_command("/year clear"), Ok(ReplCommand::Years(None)));
        assert_eq!(parse_command("/format json"), Ok(ReplCommand::Format(OutputFormat::Json)));
        assert_eq!(parse_command("/detail 3"), Ok(ReplCommand::Detail(3)));
        assert_eq!(parse_command("/help"), Ok(ReplCommand::Help));
    }

    #[test]
    fn test_invalid_commands() {
        assert!(parse_command("/top 0").is_err());
        assert!(parse_command("/top").is_err());
        assert!(parse_command("/year 2021 2019").is_err());
        assert!(parse_command("/format xml").is_err());
        assert!(parse_command("/detail 0").is_err());
        assert!(parse_command("/frobnicate").unwrap_err().contains("Unknown command"));
    }

    #[test]
    fn test_year_filter_is_clamped() {
        assert_eq!(year_filter(None, None).unwrap(), None);
        assert_eq!(year_filter(Some(2019), None).unwrap(), Some((2019, MAX_YEAR)));
        assert_eq!(year_filter(Some(0), Some(5_000_000)).unwrap(), Some((MIN_YEAR, MAX_YEAR)));
        assert_eq!(year_filter(Some(i32::MIN), Some(i32::MAX)).unwrap(), Some((MIN_YEAR, MAX_YEAR)));
        assert!(year_filter(Some(2021), Some(2019)).is_err());
    }

    #[test]
    fn test_repl_year_range_is_clamped() {
        assert_eq!(
            parse_command("/year -2147483648 2147483647"),
            Ok(ReplCommand::Years(Some((MIN_YEAR, MAX_YEAR))))
        );
    }

    #[test]
    fn test_query_uses_configured_search_type() {
        let settings = SearchSettings {
            top_k: 5,
            years: Some((2020, 2021)),
            categories: Vec::new(),
            search_type: "HYBRID".to_string(),
            format: OutputFormat::Table,
        };
        let query = build_query(&settings).unwrap();
        assert_eq!(
            query.query_string(),
            "(@year:{2020 | 2021})=>[HYBRID 5 @vector $vec_param AS vector_score]"
        );
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Schrödinger equation", 10), "Schrödi...");
    }
}
