//! # ragweave CLI (`rag`)
//!
//! The `rag` binary drives the ingestion and retrieval pipeline.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./rag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag init` | Create the SQLite store and schema |
//! | `rag ingest <source>` | Ingest from `github`, `web`, or `local` |
//! | `rag search "<query>"` | Hybrid search with reranking |

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

use ragweave::config;
use ragweave::embedding::create_provider;
use ragweave::ingest;
use ragweave::retriever::{retrieve, RetrievalReply};
use ragweave::store::Store;

/// ragweave — hybrid retrieval over GitHub repositories, web pages, and
/// local documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file describing the store, sources, and retrieval parameters.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "ragweave — hybrid retrieval over code repositories and documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite store and schema.
    ///
    /// Idempotent; running it against an existing store is safe.
    Init,

    /// Ingest documents from a configured source.
    ///
    /// Loads, chunks, embeds, and upserts. Chunk ids derive from content,
    /// so re-ingesting unchanged sources rewrites rows instead of
    /// duplicating them.
    Ingest {
        /// Source name: `github`, `web`, or `local`.
        source: String,
    },

    /// Search the store with hybrid retrieval and reranking.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to one repository (`owner/repo`).
        #[arg(long)]
        repo: Option<String>,

        /// Number of results to return.
        #[arg(long)]
        top_n: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let provider = create_provider(&cfg.embedding)?;
            let store = Store::open(&cfg.store.path, &cfg.store.collection, provider).await?;
            let count = store.count().await?;
            let collection = store.collection().to_string();
            store.close().await;
            println!(
                "Store ready at {} ({} chunks in '{}').",
                cfg.store.path.display(),
                count,
                collection
            );
        }
        Commands::Ingest { source } => {
            let src = ingest::source_from_name(&cfg, &source)?;
            let written = ingest::run_ingestion(&cfg, src.as_ref()).await?;
            println!("Ingested {} chunks from {}.", written, source);
        }
        Commands::Search { query, repo, top_n } => {
            let filter: Option<BTreeMap<String, String>> = repo
                .map(|r| [("repo".to_string(), r)].into_iter().collect());

            match retrieve(&cfg, &query, filter.as_ref(), top_n).await {
                RetrievalReply::Hits(hits) if hits.is_empty() => {
                    println!("No results.");
                }
                RetrievalReply::Hits(hits) => {
                    for (rank, hit) in hits.iter().enumerate() {
                        println!("{}. [{:.4}] {}", rank + 1, hit.score, hit.provenance());
                        if let Some(title) = hit.fields.get("title") {
                            println!("   Title: {}", title);
                        }
                        let preview: String = hit.content.chars().take(300).collect();
                        println!("   {}", preview.replace('\n', " "));
                        println!();
                    }
                }
                RetrievalReply::Error(message) => {
                    println!("{}", message);
                }
            }
        }
    }

    Ok(())
}
