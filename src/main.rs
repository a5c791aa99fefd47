//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa prepare` | Extract raw documents into the processed folder |
//! | `docqa sources` | List configured sources and the files they yield |
//! | `docqa build` | Build the corpus and write its artifacts |
//! | `docqa check` | Validate the artifacts and preview the first chunks |
//! | `docqa search "<query>"` | Query the corpus |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docqa::progress::ProgressMode;
use docqa::{commands, config, logging, sources};

/// docqa: document retrieval over local folders and blob stores.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Build and query a document retrieval corpus",
    version,
    long_about = "docqa extracts text from PDFs, Office files, images and plain text, \
    chunks and embeds it into a flat vector index, and answers queries by fusing \
    keyword and vector search."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract raw documents into `.txt` files with a metadata header.
    ///
    /// Reads `extraction.documents_dir` recursively and mirrors its folder
    /// structure under `extraction.processed_dir`.
    Prepare,

    /// List configured sources and what they currently contain.
    Sources,

    /// Build the corpus from every configured source.
    ///
    /// Failing sources are logged and skipped. Artifacts are written to
    /// `corpus.dir` only once the whole build succeeded.
    Build {
        /// Progress output on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Validate the persisted corpus and preview its first chunks.
    Check,

    /// Query the corpus.
    Search {
        /// The query text.
        query: String,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Prepare => {
            commands::run_prepare(&cfg).await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Build { progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            commands::run_build(&cfg, mode).await?;
        }
        Commands::Check => {
            commands::run_check(&cfg)?;
        }
        Commands::Search { query, top_k, json } => {
            commands::run_search(&cfg, &query, top_k, json).await?;
        }
    }

    Ok(())
}
