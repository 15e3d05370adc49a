//! Keel CLI
//!
//! Command-line tools for Keel database directories.
//!
//! # Commands
//!
//! - `inspect` - List data files, log size and unfinished transactions
//! - `dump-log` - Print log records newest-first for debugging
//! - `recover` - Undo unfinished transactions and write a checkpoint

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Keel command-line database tools.
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Block size the database was created with
    #[arg(global = true, short, long, default_value = "4096")]
    block_size: usize,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List data files, log size and unfinished transactions
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print log records newest-first
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Undo unfinished transactions and write a checkpoint
    Recover,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, cli.block_size, &format)?;
        }
        Commands::DumpLog { limit, format } => {
            let path = cli.path.ok_or("Database path required for dump-log")?;
            commands::dump_log::run(&path, cli.block_size, limit, &format)?;
        }
        Commands::Recover => {
            let path = cli.path.ok_or("Database path required for recover")?;
            commands::recover::run(&path, cli.block_size)?;
        }
        Commands::Version => {
            println!("Keel CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Keel Core v{}", keel_core::VERSION);
        }
    }

    Ok(())
}
