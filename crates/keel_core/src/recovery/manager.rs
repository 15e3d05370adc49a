//! Per-transaction recovery manager.

use crate::buffer::{Buffer, BufferManager};
use crate::error::{CoreError, CoreResult};
use crate::log::LogManager;
use crate::recovery::LogRecord;
use crate::transaction::Transaction;
use crate::types::{Lsn, TransactionId};
use keel_storage::BlockId;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Writes one transaction's log records and undoes its changes.
///
/// Cloning is cheap: a clone shares the log and buffer pool and logs for the
/// same transaction.
#[derive(Clone)]
pub struct RecoveryManager {
    txnum: TransactionId,
    log: Arc<LogManager>,
    buffers: Arc<BufferManager>,
}

impl RecoveryManager {
    /// Creates the manager and logs a `START` record for `txnum`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be appended.
    pub fn new(
        txnum: TransactionId,
        log: Arc<LogManager>,
        buffers: Arc<BufferManager>,
    ) -> CoreResult<Self> {
        let manager = Self {
            txnum,
            log,
            buffers,
        };
        manager.write(&LogRecord::Start { txnum })?;
        Ok(manager)
    }

    /// Logs the integer `buffer` holds at `offset`, before it is overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the old value cannot be read or the record cannot
    /// be appended.
    pub fn set_int(&self, buffer: &Buffer, offset: usize) -> CoreResult<Lsn> {
        let old_value = buffer.contents().get_int(offset)?;
        self.write(&LogRecord::SetInt {
            txnum: self.txnum,
            block: assigned_block(buffer)?,
            offset,
            old_value,
        })
    }

    /// Logs the string `buffer` holds at `offset`, before it is overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the old value cannot be read or the record cannot
    /// be appended.
    pub fn set_string(&self, buffer: &Buffer, offset: usize) -> CoreResult<Lsn> {
        let old_value = buffer.contents().get_string(offset)?;
        self.write(&LogRecord::SetString {
            txnum: self.txnum,
            block: assigned_block(buffer)?,
            offset,
            old_value,
        })
    }

    /// Forces the transaction's pages to disk, then makes `COMMIT` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if a flush or append fails.
    pub fn commit(&self) -> CoreResult<()> {
        self.buffers.flush_all(self.txnum)?;
        self.write_durable(&LogRecord::Commit { txnum: self.txnum })
    }

    /// Undoes the transaction's changes newest-first, then makes `ROLLBACK` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or an undo fails.
    pub fn rollback(&self, tx: &mut Transaction) -> CoreResult<()> {
        let mut undone = 0usize;
        for bytes in self.log.iter()? {
            let record = LogRecord::decode(&bytes?)?;
            if record.txnum() != Some(self.txnum) {
                continue;
            }
            if matches!(record, LogRecord::Start { .. }) {
                break;
            }
            record.undo(tx)?;
            undone += 1;
        }
        debug!(txnum = %self.txnum, undone, "rolled back changes");

        self.buffers.flush_all(self.txnum)?;
        self.write_durable(&LogRecord::Rollback { txnum: self.txnum })
    }

    /// Undoes every unfinished transaction back to the last checkpoint.
    ///
    /// Afterwards all dirty buffers are flushed and a durable `CHECKPOINT`
    /// bounds the next recovery, so a second call undoes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or an undo fails.
    pub fn recover(&self, tx: &mut Transaction) -> CoreResult<()> {
        info!(txnum = %self.txnum, "starting recovery");
        let mut finished = HashSet::new();
        let mut undone = 0usize;

        for bytes in self.log.iter()? {
            let record = LogRecord::decode(&bytes?)?;
            match &record {
                LogRecord::Checkpoint => break,
                LogRecord::Commit { txnum } | LogRecord::Rollback { txnum } => {
                    finished.insert(*txnum);
                }
                _ => {
                    if record.txnum().is_some_and(|txnum| !finished.contains(&txnum)) {
                        record.undo(tx)?;
                        if matches!(record, LogRecord::SetInt { .. } | LogRecord::SetString { .. }) {
                            undone += 1;
                        }
                    }
                }
            }
        }

        self.buffers.flush_all_modified()?;
        self.write_durable(&LogRecord::Checkpoint)?;
        info!(txnum = %self.txnum, undone, "recovery complete");
        Ok(())
    }

    /// Returns the transaction this manager logs for.
    #[must_use]
    pub fn txnum(&self) -> TransactionId {
        self.txnum
    }

    fn write(&self, record: &LogRecord) -> CoreResult<Lsn> {
        self.log.append(&record.encode()?)
    }

    fn write_durable(&self, record: &LogRecord) -> CoreResult<()> {
        let lsn = self.write(record)?;
        self.log.flush(lsn)
    }
}

fn assigned_block(buffer: &Buffer) -> CoreResult<BlockId> {
    buffer
        .block()
        .cloned()
        .ok_or_else(|| CoreError::invalid_format("buffer is not assigned to a block"))
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("txnum", &self.txnum)
            .finish_non_exhaustive()
    }
}
