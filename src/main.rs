//! # Medical Chatbot CLI (`medchat`)
//!
//! ## Usage
//!
//! ```bash
//! medchat --config ./config/medchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medchat serve` | Start the chat HTTP server |
//! | `medchat ingest [DIR]` | Index the PDFs under `DIR` (default `ingest.root`) |
//! | `medchat history <SESSION_ID>` | Print a session's stored conversation |
//!
//! Secrets are read from the environment; a `.env` file in the working
//! directory is loaded first. Log verbosity follows `MEDCHAT_LOG` (or
//! `RUST_LOG`), default `info`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use medical_chatbot::config::load_config;
use medical_chatbot::history::{connect_store, transcript};
use medical_chatbot::ingest::{run_ingest, IngestOptions};
use medical_chatbot::server::run_server;

/// Retrieval-augmented medical question answering.
#[derive(Parser)]
#[command(
    name = "medchat",
    about = "Medical chatbot: answer questions grounded in an indexed PDF corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/medchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat server on `[server].bind`.
    ///
    /// Requires GROQ_API_KEY, SESSION_SECRET and CONVERSATION_STORE_URL,
    /// plus PINECONE_API_KEY for the pinecone index.
    Serve,

    /// Load, split, embed and index every PDF under a directory.
    ///
    /// Creates the index if it does not exist. Without --dedup, re-running
    /// over the same files adds duplicate entries.
    Ingest {
        /// Directory to ingest. Defaults to `[ingest].root`.
        dir: Option<PathBuf>,

        /// Show document and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Use content-hash chunk ids so a re-run overwrites instead of duplicating.
        #[arg(long)]
        dedup: bool,
    },

    /// Print the stored turns of a chat session.
    History {
        /// The 12-character session id from the `chat_session_id` cookie.
        session_id: String,
    },
}

fn init_tracing() {
    let filter = std::env::var("MEDCHAT_LOG")
        .ok()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal in deployments that set the environment directly.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            run_server(&config).await?;
        }
        Commands::Ingest {
            dir,
            dry_run,
            dedup,
        } => {
            let root = dir.unwrap_or_else(|| config.ingest.root.clone());
            run_ingest(
                &config,
                IngestOptions {
                    root,
                    dry_run,
                    dedup,
                },
            )
            .await?;
        }
        Commands::History { session_id } => {
            let store = connect_store(&config).await?;
            let turns = store.fetch(&session_id).await?;
            if turns.is_empty() {
                println!("No conversation stored for session {}", session_id);
            } else {
                println!("{}", transcript(&turns));
            }
        }
    }

    Ok(())
}
