//! Fieldsync CLI
//!
//! Command-line tools for inspecting and resetting fieldsync local state.
//!
//! # Commands
//!
//! - `status` - Pending work and cursor state
//! - `outbox` - Dump pending events
//! - `reset` - Clear all local state (next cycle re-initializes)

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Fieldsync local-state tools.
#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the local database file
    #[arg(global = true, short, long, default_value = "fieldsync.db")]
    path: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pending work and cursor state
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump pending outbox events
    Outbox {
        /// Maximum number of events to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Clear all local state; the next sync cycle re-initializes
    Reset {
        /// Confirm the reset
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Status { format } => commands::status::run(&cli.path, &format),
        Commands::Outbox { limit, format } => commands::outbox::run(&cli.path, limit, &format),
        Commands::Reset { force } => commands::reset::run(&cli.path, force),
    }
}
