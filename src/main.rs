//! # docuchat CLI
//!
//! Commands for database initialization, document ingestion, index
//! inspection, and starting the chat server.
//!
//! ## Usage
//!
//! ```bash
//! docuchat --config ./config/docuchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docuchat init` | Create the SQLite database and run schema migrations |
//! | `docuchat ingest <user_id>` | Ingest a user's data folder into their vector collection |
//! | `docuchat status <user_id>` | Show chunk and file counts for a user's collection |
//! | `docuchat serve` | Start the HTTP chat server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docuchat::{config, index::IndexRegistry, ingest, migrate, server};

/// docuchat CLI. All commands accept a `--config` flag pointing to a TOML
/// configuration file. See `config/docuchat.example.toml` for a full
/// example.
#[derive(Parser)]
#[command(
    name = "docuchat",
    about = "docuchat — a per-user retrieval-augmented chat service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docuchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the application database schema.
    ///
    /// Creates the SQLite database file and all required tables (users,
    /// chats, uploaded_documents). Idempotent.
    Init,

    /// Ingest a user's data folder into their vector collection.
    ///
    /// Extracts, chunks, and embeds every supported file (pdf, docx, txt)
    /// in the user's data folder. Skips the work when the collection is
    /// already loaded for this process.
    Ingest {
        /// User whose data folder to ingest.
        user_id: String,
    },

    /// Show chunk and file counts for a user's vector collection.
    Status {
        /// User whose collection to inspect.
        user_id: String,
    },

    /// Start the HTTP chat server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// chat, auth, and history endpoints.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { user_id } => {
            let registry = IndexRegistry::new(&cfg)?;
            ingest::ingest_data_folder(&registry, &cfg, &user_id).await?;
        }
        Commands::Status { user_id } => {
            let registry = IndexRegistry::new(&cfg)?;
            let index = registry.get_or_create(&user_id).await?;
            let info = index.info().await?;
            println!("Collection:   {}", index.collection());
            println!("Total chunks: {}", info.total_chunks);
            println!("Loaded files: {}", info.loaded_files.len());
            for file in &info.loaded_files {
                println!("  {}", file);
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
