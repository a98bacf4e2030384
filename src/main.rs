//! # Lectern CLI (`lectern`)
//!
//! The `lectern` binary is the primary interface for Lectern. It provides
//! commands for store initialization, PDF ingestion, store inspection,
//! semantic search, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! lectern --config ./config/lectern.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lectern init` | Create the SQLite database and document directory |
//! | `lectern ingest <path>` | Ingest a PDF file or every PDF under a directory |
//! | `lectern status` | Print store condition and per-document counts |
//! | `lectern search "<query>"` | Rank indexed chunks against a query |
//! | `lectern serve` | Start the document management HTTP server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lectern::config;
use lectern::db;
use lectern::embedding;
use lectern::ingest;
use lectern::search;
use lectern::server;
use lectern::status;
use lectern::store::{self, KnowledgeStore};

/// Lectern CLI, the knowledge side of a hands-free kitchen assistant.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lectern.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Knowledge indexing and retrieval for a voice cooking assistant",
    version,
    long_about = "Lectern ingests PDF documents into a chunked, embedded SQLite store and \
    serves similarity search over the result. The same store backs live retrieval during \
    assistant sessions and a document management HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lectern.toml`. All database, chunking,
    /// embedding, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/lectern.toml")]
    config: PathBuf,

    /// Enable debug-level logging (RUST_LOG overrides this).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the knowledge store.
    ///
    /// Creates the SQLite database file, all required tables (documents,
    /// records, store_meta), and the raw document directory. This command
    /// is idempotent; running it multiple times is safe.
    Init,

    /// Ingest a PDF file or every PDF under a directory.
    ///
    /// Extracts text, chunks it, embeds the chunks with the configured
    /// provider, and stores everything in SQLite. Re-ingesting an unchanged
    /// file is detected by content hash and skips embedding.
    Ingest {
        /// A `.pdf` file or a directory to scan recursively.
        path: PathBuf,
    },

    /// Print store condition and per-document counts.
    Status,

    /// Search indexed chunks.
    ///
    /// Embeds the query with the configured provider and prints the
    /// highest-scoring chunks with excerpts.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Start the document management HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// upload, listing, deletion, and status endpoints.
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            store::run_init(&cfg).await?;
        }
        Commands::Ingest { path } => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = KnowledgeStore::open(pool).await?;
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            ingest::run_ingest(&cfg, &store, embedder.as_ref(), &path).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
