//! CLI argument parsing for the disaster-watch daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Disaster-watch daemon
///
/// Extracts disaster events from satellite imagery and serves
/// listing and similarity queries over HTTP.
#[derive(Parser, Debug)]
#[command(name = "disaster-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides ~/.config/disaster-watch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API and run scheduled ingestion
    Start {
        /// Override HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Serve only; do not register the ingestion job
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Run one ingestion pass and print its report
    Ingest {
        /// "min_lon,min_lat,max_lon,max_lat" (default from config)
        #[arg(long)]
        bbox: Option<String>,

        /// Lookback window in days (default from config)
        #[arg(long)]
        days: Option<u32>,

        /// Read the scene from a JSON file instead of the imagery provider
        #[arg(long)]
        scene_file: Option<String>,
    },

    /// Rank stored events against a free-text description
    Similar {
        description: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum AdminCommands {
    /// Show store and vector index statistics
    Stats,

    /// Rebuild the vector index from stored embeddings
    RebuildIndex,

    /// Trigger RocksDB compaction
    Compact,

    /// Print the report of the most recent ingestion run
    LastRun,
}
