//! Undo-only recovery.
//!
//! Every logged change records the value it overwrote. Commit forces the
//! transaction's pages to disk before its `COMMIT` record becomes durable, so
//! committed work never needs redoing: recovery only undoes transactions
//! that left no `COMMIT` or `ROLLBACK` behind.
//!
//! ## Record Wire Format
//!
//! All integers are 32-bit little-endian. Each record starts with its tag:
//!
//! ```text
//! CHECKPOINT  tag=0
//! START       tag=1  txnum
//! COMMIT      tag=2  txnum
//! ROLLBACK    tag=3  txnum
//! SETINT      tag=4  txnum  len filename  block  offset  old_int
//! SETSTRING   tag=5  txnum  len filename  block  offset  len old_string
//! ```

mod manager;
mod record;

pub use manager::RecoveryManager;
pub use record::{LogRecord, RecordKind};
