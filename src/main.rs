//! # Conecta CLI (`conecta`)
//!
//! ## Usage
//!
//! ```bash
//! conecta --config ./config/conecta.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `conecta init` | Create the SQLite database and run schema migrations |
//! | `conecta ingest <path> --user <id>` | Index a PDF, text or Markdown file for a user |
//! | `conecta ask "<question>" --user <id>` | Answer from that user's documents |
//! | `conecta topics <transcript.json>` | Key topics of a chat transcript |
//! | `conecta documents --user <id>` | List a user's ingested files |
//! | `conecta serve` | Start the HTTP server |
//!
//! Failures print `error [code]: message` on stderr and exit non-zero.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use conecta::{ask, config, documents, ingest, logging, migrate, server, topics};
use conecta_core::RagError;

/// Conecta: question answering over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/conecta.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "conecta",
    about = "Conecta: retrieval-augmented question answering over per-user documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/conecta.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent.
    Init,

    /// Load, chunk, embed and index a file for one user.
    Ingest {
        /// PDF, .txt or .md file.
        path: PathBuf,

        /// Owner of the document; only this user can retrieve it.
        #[arg(long = "user")]
        user_id: String,

        /// Print the provenance record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the user's documents.
    Ask {
        question: String,

        #[arg(long = "user")]
        user_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Extract key topics from a JSON transcript (`[{"role", "content"}]`).
    Topics {
        transcript: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// List a user's ingested documents, oldest first.
    Documents {
        #[arg(long = "user")]
        user_id: String,

        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(cfg.logging.format) {
        eprintln!("Warning: {}", e);
    }

    match run(cli.command, &cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<RagError>() {
                Some(rag) => eprintln!("error [{}]: {}", rag.code(), rag),
                None => eprintln!("Error: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, cfg: &config::Config) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            migrate::run_migrations(cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            user_id,
            json,
        } => {
            ingest::run_ingest(cfg, &path, &user_id, json).await?;
        }
        Commands::Ask {
            question,
            user_id,
            json,
        } => {
            ask::run_ask(cfg, &question, &user_id, json).await?;
        }
        Commands::Topics { transcript, json } => {
            topics::run_topics(cfg, &transcript, json).await?;
        }
        Commands::Documents { user_id, json } => {
            documents::run_documents(cfg, &user_id, json).await?;
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
    }
    Ok(())
}
