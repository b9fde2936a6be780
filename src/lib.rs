pub mod config;
pub mod model;
pub mod search;
pub mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use config::Config;
use search::{CancelToken, SearchError, SearchService};
use storage::SqliteCatalog;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "lookalike",
    version,
    about = "Visual product similarity search over a vector catalogue"
)]
pub struct Cli {
    /// Path to the catalogue SQLite database
    #[arg(long, default_value = "data/items.db")]
    pub db: PathBuf,

    /// Optional TOML config file with engine tunables
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print catalogue counters
    Stats,
    /// Build a search snapshot and report its size
    Check,
    /// Rank catalogue items against a query embedding
    Search {
        /// JSON file containing the query embedding (array of floats)
        query: PathBuf,

        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Skip fusion and rank by cosine similarity alone
        #[arg(long)]
        cosine_only: bool,

        /// Abort the query after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Emit results as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Stats => run_stats(&cli.db),
        Commands::Check => run_check(&cli.db, config),
        Commands::Search {
            query,
            top_k,
            cosine_only,
            timeout_ms,
            json,
        } => run_search(&cli.db, config, &query, top_k, cosine_only, timeout_ms, json),
    }
}

fn run_stats(db: &Path) -> Result<()> {
    let catalog = SqliteCatalog::open(db)?;
    let stats = catalog.stats()?;
    println!("total items:        {}", stats.total_items);
    println!("items with vectors: {}", stats.items_with_vectors);
    Ok(())
}

fn run_check(db: &Path, config: Config) -> Result<()> {
    let service = build_service(db, config)?;
    if !service.initialize() {
        bail!("snapshot build failed; see logs for the cause");
    }
    match service.snapshot_len() {
        Some(len) => println!("snapshot ready: {len} vectors"),
        None => bail!("snapshot missing after initialization"),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    db: &Path,
    config: Config,
    query_path: &Path,
    top_k: usize,
    cosine_only: bool,
    timeout_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let embedding = read_embedding(query_path)?;
    let service = build_service(db, config)?;
    if !service.initialize() {
        bail!("snapshot build failed; see logs for the cause");
    }

    let cancel = CancelToken::new();
    if let Some(ms) = timeout_ms {
        let watchdog = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            watchdog.cancel();
        });
    }

    let result = if cosine_only {
        service.search_cosine(&embedding, top_k, None)
    } else {
        service.search_with_cancel(&embedding, top_k, &cancel)
    };

    let hits = match result {
        Ok(hits) => hits,
        Err(SearchError::Cancelled) => bail!("query timed out after {}ms", timeout_ms.unwrap_or(0)),
        Err(err) => return Err(err.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else if hits.is_empty() {
        println!("no matches");
    } else {
        for hit in hits {
            println!("{}\t{:.3}\t{}", hit.item_id, hit.score, hit.image_url);
        }
    }
    Ok(())
}

fn build_service(db: &Path, config: Config) -> Result<SearchService> {
    let catalog = Arc::new(SqliteCatalog::open(db)?);
    Ok(SearchService::new(catalog.clone(), catalog, config))
}

fn read_embedding(path: &Path) -> Result<Vec<f32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read query embedding {}", path.display()))?;
    let embedding: Vec<f32> = serde_json::from_str(&text)
        .with_context(|| format!("parse query embedding {}", path.display()))?;
    if embedding.is_empty() {
        bail!("query embedding is empty");
    }
    Ok(embedding)
}
