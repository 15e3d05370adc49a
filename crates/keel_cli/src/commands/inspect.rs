//! Inspect command implementation.

use keel_core::{CoreResult, DatabaseDir, LogIterator, LogRecord};
use keel_storage::{BlockStore, FileBlockStore};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

const LOCK_FILE: &str = "LOCK";

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Block size used to size the files.
    pub block_size: usize,
    /// Log file name.
    pub log_file: String,
    /// Number of log blocks.
    pub log_blocks: u32,
    /// Number of readable log records.
    pub log_records: usize,
    /// Records written since the most recent checkpoint.
    pub records_since_checkpoint: usize,
    /// Transactions with records after the last checkpoint but no commit or rollback.
    pub unfinished_transactions: Vec<u32>,
    /// Data files and their sizes.
    pub files: Vec<FileStats>,
}

/// Statistics for a single data file.
#[derive(Debug, Serialize)]
pub struct FileStats {
    /// File name.
    pub name: String,
    /// Number of blocks.
    pub blocks: u32,
}

/// Summary of the log tail back to the newest checkpoint.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LogSummary {
    /// Total readable records.
    pub records: usize,
    /// Records newer than the newest checkpoint.
    pub since_checkpoint: usize,
    /// Unfinished transaction numbers, ascending.
    pub unfinished: Vec<u32>,
}

/// Runs the inspect command.
///
/// The log is read as it is on disk and nothing in the database is written.
pub fn run(path: &Path, block_size: usize, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::existing_db_config(block_size);
    let _dir = DatabaseDir::open(path, &config.log_file, false)?;
    let store = Arc::new(FileBlockStore::open(path, block_size)?);

    let log_blocks = store.size(&config.log_file)?;
    if log_blocks == 0 {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let summary = summarize_log(LogIterator::on_disk(store.clone(), &config.log_file)?)?;

    let mut files = Vec::new();
    for name in store.files()? {
        if name == config.log_file || name == LOCK_FILE {
            continue;
        }
        let blocks = store.size(&name)?;
        files.push(FileStats { name, blocks });
    }

    let result = InspectResult {
        path: path.display().to_string(),
        block_size,
        log_file: config.log_file.clone(),
        log_blocks,
        log_records: summary.records,
        records_since_checkpoint: summary.since_checkpoint,
        unfinished_transactions: summary.unfinished,
        files,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Walks the whole log and reports what a recovery would have to undo.
pub fn summarize_log(records: LogIterator) -> CoreResult<LogSummary> {
    let mut summary = LogSummary::default();
    let mut finished = HashSet::new();
    let mut unfinished = BTreeSet::new();
    let mut past_checkpoint = false;

    for bytes in records {
        let record = LogRecord::decode(&bytes?)?;
        summary.records += 1;
        if past_checkpoint {
            continue;
        }
        match record {
            LogRecord::Checkpoint => past_checkpoint = true,
            LogRecord::Commit { txnum } | LogRecord::Rollback { txnum } => {
                finished.insert(txnum);
            }
            other => {
                if let Some(txnum) = other.txnum().filter(|txnum| !finished.contains(txnum)) {
                    unfinished.insert(txnum.as_u32());
                }
            }
        }
        if !past_checkpoint {
            summary.since_checkpoint += 1;
        }
    }

    summary.unfinished = unfinished.into_iter().collect();
    Ok(summary)
}

fn print_text_output(result: &InspectResult) {
    println!("Keel Database: {}", result.path);
    println!("================");
    println!();
    println!("Block size:   {} bytes", result.block_size);
    println!("Log file:     {}", result.log_file);
    println!("Log blocks:   {}", result.log_blocks);
    println!("Log records:  {}", result.log_records);
    println!("Since checkpoint: {}", result.records_since_checkpoint);
    if result.unfinished_transactions.is_empty() {
        println!("Unfinished transactions: none");
    } else {
        println!("Unfinished transactions: {:?}", result.unfinished_transactions);
    }

    println!();
    println!("Data Files ({}):", result.files.len());
    for file in &result.files {
        println!("  {:<24} {:>8} blocks", file.name, file.blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{Config, Database};
    use keel_storage::{BlockId, InMemoryBlockStore};
    use std::fs::OpenOptions;
    use std::io::Write;

    fn db() -> Database {
        Database::with_store(Arc::new(InMemoryBlockStore::new(400)), Config::new()).unwrap()
    }

    fn write(db: &Database, block: &BlockId, value: i32) -> keel_core::Transaction {
        let mut tx = db.begin().unwrap();
        tx.pin(block).unwrap();
        tx.set_int(block, 0, value, true).unwrap();
        tx
    }

    #[test]
    fn empty_log_has_nothing_to_undo() {
        assert_eq!(summarize_log(db().log().iter().unwrap()).unwrap(), LogSummary::default());
    }

    #[test]
    fn reports_unfinished_transactions() {
        let db = db();
        let mut committed = write(&db, &BlockId::new("a.tbl", 0), 1);
        committed.commit().unwrap();
        let _open = write(&db, &BlockId::new("b.tbl", 0), 2);

        let summary = summarize_log(db.log().iter().unwrap()).unwrap();
        assert_eq!(summary.records, 5);
        assert_eq!(summary.since_checkpoint, 5);
        assert_eq!(summary.unfinished, vec![2]);
    }

    #[test]
    fn checkpoint_bounds_the_summary() {
        let store = Arc::new(InMemoryBlockStore::new(400));
        {
            let db = Database::with_store(store.clone(), Config::new()).unwrap();
            let _abandoned = write(&db, &BlockId::new("a.tbl", 0), 1);
            db.buffers().flush_all_modified().unwrap();
        }
        let db = Database::with_store(store, Config::new()).unwrap();
        db.recover().unwrap();

        // START and SETINT of the abandoned transaction, then START,
        // CHECKPOINT and COMMIT of the recovery transaction.
        let summary = summarize_log(db.log().iter().unwrap()).unwrap();
        assert_eq!(summary.records, 5);
        assert_eq!(summary.since_checkpoint, 1);
        assert!(summary.unfinished.is_empty());
    }

    #[test]
    fn inspect_leaves_the_log_untouched() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = Database::open(dir.path(), Config::new().block_size(400)).unwrap();
            let mut tx = write(&db, &BlockId::new("a.tbl", 0), 1);
            tx.commit().unwrap();
        }
        // A torn tail block: opening a log writer here would append a fresh one.
        let log_path = dir.path().join("keel.log");
        OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap()
            .write_all(&[0; 400])
            .unwrap();
        let before = std::fs::read(&log_path).unwrap();

        run(dir.path(), 400, "json").unwrap();
        assert_eq!(std::fs::read(&log_path).unwrap(), before);

        let store = Arc::new(FileBlockStore::open(dir.path(), 400).unwrap());
        let summary = summarize_log(LogIterator::on_disk(store, "keel.log").unwrap()).unwrap();
        assert_eq!(summary.records, 3);
        assert!(summary.unfinished.is_empty());
    }
}
