//! Disaster-watch daemon
//!
//! Turns satellite imagery into stored disaster events and answers
//! listing and similarity queries over HTTP.
//!
//! # Usage
//!
//! ```bash
//! disaster-daemon start [--port PORT] [--db-path PATH] [--no-scheduler]
//! disaster-daemon ingest [--bbox B] [--days N] [--scene-file F]
//! disaster-daemon similar "<description>" [--top-k K]
//! disaster-daemon admin stats|rebuild-index|compact|last-run
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/disaster-watch/config.toml)
//! 3. Environment variables (DISASTER_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use disaster_daemon::{handle_admin, run_ingest, run_similar, start_daemon, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let db_path = cli.db_path.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Start { port, no_scheduler } => {
            start_daemon(config, port, db_path, log_level, no_scheduler).await?;
        }
        Commands::Ingest {
            bbox,
            days,
            scene_file,
        } => {
            run_ingest(config, db_path, log_level, bbox, days, scene_file.as_deref()).await?;
        }
        Commands::Similar { description, top_k } => {
            run_similar(config, db_path, log_level, &description, top_k).await?;
        }
        Commands::Admin { command } => {
            handle_admin(config, db_path, log_level, command)?;
        }
    }

    Ok(())
}
