//! # Research Library CLI (`rlib`)
//!
//! Ingest text resources into a local library and answer questions from it
//! with cited snippets.
//!
//! ## Usage
//!
//! ```bash
//! rlib --config ./config/rlib.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rlib init` | Create the store layout and an empty index |
//! | `rlib ingest <path>` | Ingest a file or a directory of text files |
//! | `rlib list` | List resources in insertion order |
//! | `rlib get <id>` | Print a resource's metadata and content |
//! | `rlib query "<question>"` | Ranked citations, or "no local match" |
//! | `rlib rebuild` | Rebuild the index from the store |
//! | `rlib remove <id>` | Delete a resource |
//! | `rlib annotate <id> <summary>` | Attach a summary |
//! | `rlib stats` | Counts and index health |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a page fetched by another tool, with its URL as provenance
//! rlib ingest page.md --url https://example.com/qubits --raw page.html
//!
//! # Record which web search produced it
//! rlib ingest hit.md --url https://example.com/hit --query "qubit error rates"
//!
//! # Ask, with the scoring breakdown
//! rlib query "how do qubits work" --explain
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use research_library::config;
use research_library::ingest::IngestOptions;
use research_library::query::QueryOptions;
use research_library::{get, ingest, list, logging, manage, query, stats};

/// Research Library CLI: a local-first store of text resources with TF-IDF
/// retrieval and cited answers.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the file does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "rlib",
    about = "Research Library: ingest text resources and answer questions with cited sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rlib.toml`; missing files fall back to
    /// built-in defaults.
    #[arg(long, global = true, default_value = "./config/rlib.toml")]
    config: PathBuf,

    /// Debug-level logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create the store directories and an index snapshot.
    ///
    /// Idempotent: running it on an existing library only repairs a
    /// missing or degraded index.
    Init,

    /// Ingest a text file, or every matching file under a directory.
    ///
    /// Directories are walked recursively and filtered by the
    /// `[ingest]` include/exclude globs.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Record the content as fetched from this URL. The resource id is
        /// derived from the URL instead of the content.
        #[arg(long)]
        url: Option<String>,

        /// Web search query that produced `--url`.
        #[arg(long, requires = "url")]
        query: Option<String>,

        /// Title to store instead of the extracted one.
        #[arg(long)]
        title: Option<String>,

        /// Original bytes (e.g. HTML) kept alongside for provenance.
        #[arg(long)]
        raw: Option<PathBuf>,
    },

    /// List resources in insertion order.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print a resource's metadata and content.
    Get {
        /// Resource id (12 hex characters).
        id: String,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the local library.
    ///
    /// Prints ranked citations with snippets, or "No local match." when
    /// nothing in the library is relevant. Both exit with status 0.
    Query {
        /// The question.
        question: String,

        /// Maximum number of citations (overrides `query.top_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Show the per-term score breakdown.
        #[arg(long)]
        explain: bool,

        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the index from the store.
    Rebuild,

    /// Delete a resource and drop it from the index.
    Remove {
        /// Resource id.
        id: String,
    },

    /// Attach a summary to a resource.
    Annotate {
        /// Resource id.
        id: String,
        /// Summary text.
        summary: String,
    },

    /// Show resource and index counts and index health.
    Stats {
        /// Print JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            manage::run_init(&cfg).await?;
        }
        Commands::Ingest {
            path,
            url,
            query,
            title,
            raw,
        } => {
            let options = IngestOptions {
                url,
                query,
                title,
                raw,
            };
            ingest::run_ingest(&cfg, &path, &options).await?;
        }
        Commands::List { json } => {
            list::run_list(&cfg, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Query {
            question,
            top_k,
            explain,
            json,
        } => {
            let options = QueryOptions {
                top_k,
                explain,
                json,
            };
            query::run_query(&cfg, &question, &options).await?;
        }
        Commands::Rebuild => {
            manage::run_rebuild(&cfg).await?;
        }
        Commands::Remove { id } => {
            manage::run_remove(&cfg, &id).await?;
        }
        Commands::Annotate { id, summary } => {
            manage::run_annotate(&cfg, &id, &summary).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}
