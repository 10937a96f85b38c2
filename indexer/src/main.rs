use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kb_core::{EngineConfig, IndexManager, Interrupt, JsonSource};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "kb")]
#[command(about = "Keyword search, related items and similarity graph over a JSON knowledge corpus", long_about = None)]
struct Cli {
    /// Corpus path: a .json/.jsonl file or a directory of them
    #[arg(long)]
    input: PathBuf,
    /// JSON engine config file (KB_* environment variables override it)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Abort index construction and graph building after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the corpus and print counts
    Stats,
    /// Exact keyword hits followed by related items
    Search {
        #[arg(long)]
        q: String,
        #[arg(long)]
        k: Option<usize>,
    },
    /// Nearest neighbors of one item
    Similar {
        #[arg(long)]
        id: String,
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Similarity graph over the whole corpus
    Graph {
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        max_per_item: Option<usize>,
    },
    /// Cosine similarity between two items
    Score {
        #[arg(long)]
        a: String,
        #[arg(long)]
        b: String,
    },
    /// Similarity of one item to every other item, unfiltered
    Explain {
        #[arg(long)]
        id: String,
    },
    /// Most characteristic terms of a set of items
    Terms {
        #[arg(long, required = true, num_args = 1..)]
        ids: Vec<String>,
        #[arg(long, default_value_t = 5)]
        k: usize,
    },
    /// Group the corpus into topical clusters
    Clusters {
        /// Cluster count; estimated when omitted
        #[arg(long)]
        k: Option<usize>,
    },
}

#[derive(Serialize)]
struct Stats {
    documents: usize,
    indexed: usize,
    skipped: usize,
    took_ms: u128,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading engine config")?;
    if let Commands::Graph { threshold, max_per_item } = &cli.command {
        if let Some(t) = threshold { config.similarity_threshold = *t; }
        if let Some(k) = max_per_item { config.neighbor_limit = *k; }
        config.validate()?;
    }

    let interrupt = match cli.timeout_secs {
        Some(secs) => Interrupt::with_timeout(Duration::from_secs(secs)),
        None => Interrupt::none(),
    };

    let manager = IndexManager::new(config)?;
    let report = manager
        .rebuild(&JsonSource::new(&cli.input), &interrupt)
        .with_context(|| format!("indexing {}", cli.input.display()))?;
    tracing::info!(indexed = report.indexed, skipped = report.skipped, "corpus indexed");
    let reader = manager.reader();

    match cli.command {
        Commands::Stats => print(&Stats {
            documents: reader.len(),
            indexed: report.indexed,
            skipped: report.skipped,
            took_ms: report.took_ms,
        }),
        Commands::Search { q, k } => {
            let k = k.unwrap_or(manager.config().search_limit).clamp(1, 100);
            print(&reader.search(&q, k))
        }
        Commands::Similar { id, threshold, limit } => {
            let threshold = threshold.unwrap_or(manager.config().similarity_threshold);
            let limit = limit.unwrap_or(manager.config().neighbor_limit);
            print(&reader.find_similar(&id, threshold, limit)?)
        }
        Commands::Graph { .. } => print(&reader.graph_with(&interrupt)?),
        Commands::Score { a, b } => print(&serde_json::json!({
            "a": a,
            "b": b,
            "similarity": reader.similarity_score(&a, &b)?,
        })),
        Commands::Explain { id } => print(&reader.explain_connections(&id)?),
        Commands::Terms { ids, k } => print(&reader.top_terms(&ids, k)?),
        Commands::Clusters { k } => print(&reader.clusters_with(k, &interrupt)?),
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
