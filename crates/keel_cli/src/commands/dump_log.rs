//! Dump log command implementation.

use super::existing_db_config;
use keel_core::{CoreResult, Database, LogManager, LogRecord};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Log record representation for output.
#[derive(Debug, Serialize)]
pub struct LogRecordInfo {
    /// Position counted from the newest record (0 = newest).
    pub position: usize,
    /// Record kind.
    pub kind: &'static str,
    /// Transaction number (absent for checkpoints).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txnum: Option<u32>,
    /// File of the changed block (set records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Number of the changed block (set records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u32>,
    /// Byte offset inside the block (set records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// Value before the change (set records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Display form of the record.
    #[serde(skip)]
    pub text: String,
}

impl LogRecordInfo {
    fn new(position: usize, record: &LogRecord) -> Self {
        let mut info = Self {
            position,
            kind: record.kind().name(),
            txnum: record.txnum().map(|txnum| txnum.as_u32()),
            file: None,
            block: None,
            offset: None,
            old_value: None,
            text: record.to_string(),
        };
        match record {
            LogRecord::SetInt {
                block,
                offset,
                old_value,
                ..
            } => {
                info.file = Some(block.filename().to_string());
                info.block = Some(block.number());
                info.offset = Some(*offset);
                info.old_value = Some(Value::from(*old_value));
            }
            LogRecord::SetString {
                block,
                offset,
                old_value,
                ..
            } => {
                info.file = Some(block.filename().to_string());
                info.block = Some(block.number());
                info.offset = Some(*offset);
                info.old_value = Some(Value::from(old_value.as_str()));
            }
            LogRecord::Checkpoint
            | LogRecord::Start { .. }
            | LogRecord::Commit { .. }
            | LogRecord::Rollback { .. } => {}
        }
        info
    }
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    block_size: usize,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(path, existing_db_config(block_size))?;
    let records = read_log_records(db.log(), limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            print_text_output(&records);
        }
    }

    Ok(())
}

/// Decodes up to `limit` records, newest first.
pub fn read_log_records(log: &LogManager, limit: Option<usize>) -> CoreResult<Vec<LogRecordInfo>> {
    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    for (position, bytes) in log.iter()?.take(max_records).enumerate() {
        let record = LogRecord::decode(&bytes?)?;
        records.push(LogRecordInfo::new(position, &record));
    }

    Ok(records)
}

fn print_text_output(records: &[LogRecordInfo]) {
    println!("Log Records ({} shown, newest first)", records.len());
    println!("================");
    println!();

    for record in records {
        println!("[{:06}] {}", record.position, record.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{Config, TransactionId};
    use keel_storage::{BlockId, InMemoryBlockStore};
    use std::sync::Arc;

    fn sample_db() -> Database {
        let db = Database::with_store(Arc::new(InMemoryBlockStore::new(400)), Config::new()).unwrap();
        let block = BlockId::new("data.tbl", 2);
        let mut tx = db.begin().unwrap();
        tx.pin(&block).unwrap();
        tx.set_int(&block, 8, 5, true).unwrap();
        tx.set_string(&block, 20, "abc", true).unwrap();
        tx.commit().unwrap();
        db
    }

    #[test]
    fn records_come_back_newest_first() {
        let db = sample_db();
        let records = read_log_records(db.log(), None).unwrap();
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec!["COMMIT", "SETSTRING", "SETINT", "START"]);
        assert_eq!(records[0].position, 0);
        assert_eq!(records[0].txnum, Some(TransactionId::new(1).as_u32()));
    }

    #[test]
    fn set_records_carry_their_location() {
        let db = sample_db();
        let records = read_log_records(db.log(), None).unwrap();
        let set_int = &records[2];
        assert_eq!(set_int.file.as_deref(), Some("data.tbl"));
        assert_eq!(set_int.block, Some(2));
        assert_eq!(set_int.offset, Some(8));
        assert_eq!(set_int.old_value, Some(Value::from(0)));
        assert_eq!(records[1].old_value, Some(Value::from("")));
    }

    #[test]
    fn limit_truncates_output() {
        let db = sample_db();
        let records = read_log_records(db.log(), Some(2)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, "SETSTRING");
    }

    #[test]
    fn json_skips_empty_fields() {
        let db = sample_db();
        let records = read_log_records(db.log(), Some(1)).unwrap();
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["kind"], "COMMIT");
        assert!(json.get("file").is_none());
        assert!(json.get("text").is_none());
    }
}
