//! # Nestie CLI (`nestie`)
//!
//! ## Usage
//!
//! ```bash
//! nestie --config ./config/nestie.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `nestie run` | Ingest documents, then serve Slack Socket Mode |
//! | `nestie ingest` | Ingest documents and print a report |
//! | `nestie search "<query>"` | Show the chunks retrieval would use |
//! | `nestie ask "<question>"` | Answer one question locally |
//! | `nestie status` | Print configuration and index summary |
//!
//! ## Examples
//!
//! ```bash
//! # Check what would be ingested
//! nestie ingest --dry-run
//!
//! # Inspect retrieval for a question
//! nestie search "vacation policy" --limit 5
//!
//! # Start the bot
//! SLACK_BOT_TOKEN=xoxb-... SLACK_APP_TOKEN=xapp-... nestie run
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nestie::app::App;
use nestie::{config, logging, search, serve, status};

/// Nestie: a Slack assistant that answers from company documents,
/// summarizes channels, and chats.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/nestie.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "nestie",
    about = "Nestie: a Slack assistant grounded in your team's documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/nestie.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest documents, then connect to Slack and answer messages.
    ///
    /// Requires `slack.bot_token` and `slack.app_token` (or the
    /// `SLACK_BOT_TOKEN` / `SLACK_APP_TOKEN` environment variables).
    Run,

    /// Load, chunk, embed, and index every configured document.
    ///
    /// Documents whose content is unchanged since the last run are skipped.
    Ingest {
        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Retrieve the chunks most similar to a query, with scores.
    Search {
        /// The search query string.
        query: String,

        /// Number of chunks to return (default: `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer one question through the full assistant pipeline.
    Ask {
        /// The question, as it would be typed in Slack.
        question: String,
    },

    /// Print a configuration and index summary.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    if matches!(cli.command, Commands::Run) {
        // Fail on missing tokens before spending time on ingestion.
        cfg.slack_credentials()?;
    }

    let app = App::open(cfg).await?;

    match cli.command {
        Commands::Run => {
            serve::run_serve(&app).await?;
        }
        Commands::Ingest { dry_run } => {
            let report = app.ingest(dry_run).await?;
            report.print();
        }
        Commands::Search { query, limit } => {
            search::run_search(&app, &query, limit).await?;
        }
        Commands::Ask { question } => {
            serve::run_ask(&app, &question).await?;
        }
        Commands::Status => {
            status::run_status(&app).await?;
        }
    }

    Ok(())
}
