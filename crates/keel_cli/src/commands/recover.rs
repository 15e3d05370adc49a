//! Recover command implementation.

use super::existing_db_config;
use keel_core::Database;
use std::path::Path;
use tracing::info;

/// Runs the recover command.
pub fn run(path: &Path, block_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(path, existing_db_config(block_size))?;
    if db.is_new() {
        return Err(format!("No database found at {}", path.display()).into());
    }

    let before = db.log().latest_lsn();
    db.recover()?;
    info!(path = %path.display(), "recovery complete");

    println!("Recovered {}", path.display());
    println!(
        "Log records written by recovery: {}",
        records_written(before, db.log().latest_lsn())
    );
    Ok(())
}

fn records_written(before: Option<keel_core::Lsn>, after: Option<keel_core::Lsn>) -> u64 {
    let start = before.map_or(0, |lsn| lsn.as_u64());
    after.map_or(0, |lsn| lsn.as_u64()).saturating_sub(start)
}
