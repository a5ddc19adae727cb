//! Synq CLI
//!
//! Command-line tools for the offline state a Synq engine keeps on disk.
//!
//! # Commands
//!
//! - `inspect` - Summarize queue, dead-letter, cache and last sync
//! - `queue list` - List pending mutations in drain order
//! - `dead-letter list` - List archived mutations with their failure reasons
//! - `dead-letter retry` - Move archived mutations back into the queue
//! - `cache clear` - Remove every cache entry

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Synq offline state tools.
#[derive(Parser)]
#[command(name = "synq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the engine's state document
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the stored sync state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Pending mutation queue
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Archived mutations that exhausted their retries
    #[command(subcommand)]
    DeadLetter(DeadLetterCommand),

    /// Offline cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List pending items in drain order
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum DeadLetterCommand {
    /// List archived items
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Re-queue archived items (all of them when no id is given)
    Retry {
        /// Item id to re-queue; may be repeated
        #[arg(short, long = "id")]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Remove every cache entry
    Clear,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("State path required for inspect")?;
            commands::inspect::run(&path, format.parse()?)?;
        }
        Commands::Queue(QueueCommand::List { format }) => {
            let path = cli.path.ok_or("State path required for queue list")?;
            commands::queue::list(&path, format.parse()?)?;
        }
        Commands::DeadLetter(DeadLetterCommand::List { format }) => {
            let path = cli.path.ok_or("State path required for dead-letter list")?;
            commands::dead_letter::list(&path, format.parse()?)?;
        }
        Commands::DeadLetter(DeadLetterCommand::Retry { ids }) => {
            let path = cli.path.ok_or("State path required for dead-letter retry")?;
            commands::dead_letter::retry(&path, &ids)?;
        }
        Commands::Cache(CacheCommand::Clear) => {
            let path = cli.path.ok_or("State path required for cache clear")?;
            commands::cache::clear(&path)?;
        }
        Commands::Version => {
            println!("Synq CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Synq Engine v{}", synq_engine::VERSION);
        }
    }

    Ok(())
}
