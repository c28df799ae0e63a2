//! Disaster-watch daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, ingest, similar, admin)

pub mod cli;
pub mod commands;

pub use cli::{AdminCommands, Cli, Commands};
pub use commands::{
    admin_output, handle_admin, imagery_source, ingest_once, init_logging, load_settings,
    open_store, run_ingest, run_similar, similar_once, start_daemon,
};
