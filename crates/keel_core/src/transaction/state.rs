//! Transaction state and the transaction facade.

use crate::buffer::BufferManager;
use crate::error::{CoreError, CoreResult};
use crate::lock::{ConcurrencyManager, LockMode, LockTable};
use crate::log::LogManager;
use crate::recovery::RecoveryManager;
use crate::transaction::pins::BufferList;
use crate::types::TransactionId;
use keel_storage::{BlockId, BlockNumber, BlockStore};
use std::sync::Arc;
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

/// A transaction over the shared buffer pool, log and lock table.
///
/// Every page access goes through a block the transaction has pinned.
/// Reads take shared locks and writes exclusive locks; locks are held until
/// [`Transaction::commit`] or [`Transaction::rollback`], which also release
/// every pin the transaction still holds.
///
/// Errors leave the transaction active. After a `BufferAbort` or `LockAbort`
/// the caller should roll it back.
pub struct Transaction {
    txnum: TransactionId,
    state: TransactionState,
    store: Arc<dyn BlockStore>,
    buffers: Arc<BufferManager>,
    recovery: RecoveryManager,
    concurrency: ConcurrencyManager,
    pins: BufferList,
}

impl Transaction {
    /// Starts transaction `txnum`, logging its `START` record.
    ///
    /// Most callers use [`crate::Database::begin`], which allocates the number.
    ///
    /// # Errors
    ///
    /// Returns an error if the `START` record cannot be appended.
    pub fn new(
        txnum: TransactionId,
        store: Arc<dyn BlockStore>,
        log: Arc<LogManager>,
        buffers: Arc<BufferManager>,
        lock_table: Arc<LockTable>,
    ) -> CoreResult<Self> {
        let recovery = RecoveryManager::new(txnum, log, Arc::clone(&buffers))?;
        debug!(%txnum, "transaction started");
        Ok(Self {
            txnum,
            state: TransactionState::Active,
            store,
            pins: BufferList::new(Arc::clone(&buffers)),
            buffers,
            recovery,
            concurrency: ConcurrencyManager::new(lock_table),
        })
    }

    /// Returns the transaction number.
    #[must_use]
    pub fn txnum(&self) -> TransactionId {
        self.txnum
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Commits: forces this transaction's pages, then a durable `COMMIT`.
    ///
    /// Locks and pins are released afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not active or a flush fails.
    /// The transaction stays active on failure.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.recovery.commit()?;
        self.finish(TransactionState::Committed);
        Ok(())
    }

    /// Rolls back: undoes this transaction's changes, then a durable `ROLLBACK`.
    ///
    /// Locks and pins are released afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not active or an undo fails.
    pub fn rollback(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        let recovery = self.recovery.clone();
        recovery.rollback(self)?;
        self.finish(TransactionState::RolledBack);
        Ok(())
    }

    /// Undoes every transaction left unfinished by a crash.
    ///
    /// Run this on a fresh transaction before any other transaction starts,
    /// then commit it. Locks taken while undoing are held until that commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or an undo fails.
    pub fn recover(&mut self) -> CoreResult<()> {
        self.ensure_active()?;
        self.buffers.flush_all(self.txnum)?;
        let recovery = self.recovery.clone();
        recovery.recover(self)
    }

    /// Pins `block` for this transaction.
    ///
    /// # Errors
    ///
    /// Returns `BufferAbort` if the pool stays exhausted past the wait threshold.
    pub fn pin(&mut self, block: &BlockId) -> CoreResult<()> {
        self.ensure_active()?;
        self.pins.pin(block)
    }

    /// Releases one of this transaction's pins on `block`.
    ///
    /// # Errors
    ///
    /// Returns `BlockNotPinned` if the transaction holds no pin on `block`.
    pub fn unpin(&mut self, block: &BlockId) -> CoreResult<()> {
        self.ensure_active()?;
        self.pins.unpin(block)
    }

    /// Reads the integer at `offset` of a pinned block under a shared lock.
    ///
    /// # Errors
    ///
    /// Returns `BlockNotPinned`, `LockAbort`, or a page bounds error.
    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> CoreResult<i32> {
        self.ensure_active()?;
        let buffer = Arc::clone(self.pins.buffer(block)?);
        self.concurrency.slock(block)?;
        let value = buffer.lock().contents().get_int(offset)?;
        Ok(value)
    }

    /// Reads the string at `offset` of a pinned block under a shared lock.
    ///
    /// # Errors
    ///
    /// Returns `BlockNotPinned`, `LockAbort`, or a page decoding error.
    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> CoreResult<String> {
        self.ensure_active()?;
        let buffer = Arc::clone(self.pins.buffer(block)?);
        self.concurrency.slock(block)?;
        let value = buffer.lock().contents().get_string(offset)?;
        Ok(value)
    }

    /// Writes an integer at `offset` of a pinned block under an exclusive lock.
    ///
    /// With `log` set, an undo record holding the old value is appended
    /// first and the buffer is stamped with its LSN. Unlogged writes still
    /// mark the buffer dirty for this transaction.
    ///
    /// # Errors
    ///
    /// Returns `BlockNotPinned`, `LockAbort`, a page bounds error, or a log error.
    pub fn set_int(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: i32,
        log: bool,
    ) -> CoreResult<()> {
        self.ensure_active()?;
        let buffer = Arc::clone(self.pins.buffer(block)?);
        self.concurrency.xlock(block)?;

        let mut guard = buffer.lock();
        let lsn = if log {
            Some(self.recovery.set_int(&guard, offset)?)
        } else {
            None
        };
        guard.contents_mut().set_int(offset, value)?;
        guard.set_modified(self.txnum, lsn);
        Ok(())
    }

    /// Writes a string at `offset` of a pinned block under an exclusive lock.
    ///
    /// Logging behaves as in [`Transaction::set_int`].
    ///
    /// # Errors
    ///
    /// Returns `BlockNotPinned`, `LockAbort`, a page bounds error, or a log error.
    pub fn set_string(
        &mut self,
        block: &BlockId,
        offset: usize,
        value: &str,
        log: bool,
    ) -> CoreResult<()> {
        self.ensure_active()?;
        let buffer = Arc::clone(self.pins.buffer(block)?);
        self.concurrency.xlock(block)?;

        let mut guard = buffer.lock();
        let lsn = if log {
            Some(self.recovery.set_string(&guard, offset)?)
        } else {
            None
        };
        guard.contents_mut().set_string(offset, value)?;
        guard.set_modified(self.txnum, lsn);
        Ok(())
    }

    /// Returns the number of blocks in `filename`, under a shared end-of-file lock.
    ///
    /// # Errors
    ///
    /// Returns `LockAbort` or a storage error.
    pub fn size(&mut self, filename: &str) -> CoreResult<BlockNumber> {
        self.ensure_active()?;
        self.concurrency.slock(&BlockId::end_of_file(filename))?;
        Ok(self.store.size(filename)?)
    }

    /// Appends a zeroed block to `filename`, under an exclusive end-of-file lock.
    ///
    /// # Errors
    ///
    /// Returns `LockAbort` or a storage error.
    pub fn append(&mut self, filename: &str) -> CoreResult<BlockId> {
        self.ensure_active()?;
        self.concurrency.xlock(&BlockId::end_of_file(filename))?;
        Ok(self.store.append(filename)?)
    }

    /// Returns the block size of the underlying store.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.store.block_size()
    }

    /// Returns the number of unpinned buffers in the shared pool.
    #[must_use]
    pub fn available_buffers(&self) -> usize {
        self.buffers.available()
    }

    /// Returns the number of distinct blocks this transaction has pinned.
    #[must_use]
    pub fn pinned_count(&self) -> usize {
        self.pins.len()
    }

    /// Returns the number of blocks this transaction holds locks on.
    #[must_use]
    pub fn held_locks(&self) -> usize {
        self.concurrency.held_count()
    }

    /// Returns the lock mode this transaction holds on `block`, if any.
    #[must_use]
    pub fn lock_mode(&self, block: &BlockId) -> Option<LockMode> {
        self.concurrency.holds(block)
    }

    fn finish(&mut self, state: TransactionState) {
        self.concurrency.release();
        self.pins.unpin_all();
        self.state = state;
        debug!(txnum = %self.txnum, ?state, "transaction finished");
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.state != TransactionState::Active {
            return Err(CoreError::TransactionNotActive {
                txnum: self.txnum,
                state: self.state,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("txnum", &self.txnum)
            .field("state", &self.state)
            .field("pinned", &self.pins.len())
            .field("locks", &self.concurrency.held_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::LogRecord;
    use keel_storage::InMemoryBlockStore;
    use std::time::Duration;

    struct Engine {
        store: Arc<InMemoryBlockStore>,
        log: Arc<LogManager>,
        buffers: Arc<BufferManager>,
        locks: Arc<LockTable>,
    }

    impl Engine {
        fn new() -> Self {
            let store = Arc::new(InMemoryBlockStore::new(400));
            let log = Arc::new(LogManager::new(store.clone(), "test.log").unwrap());
            let buffers = Arc::new(BufferManager::new(
                store.clone(),
                Arc::clone(&log),
                8,
                Duration::from_millis(50),
            ));
            let locks = Arc::new(LockTable::new(Duration::from_millis(50)));
            Self {
                store,
                log,
                buffers,
                locks,
            }
        }

        fn begin(&self, txnum: u32) -> Transaction {
            Transaction::new(
                TransactionId::new(txnum),
                self.store.clone(),
                Arc::clone(&self.log),
                Arc::clone(&self.buffers),
                Arc::clone(&self.locks),
            )
            .unwrap()
        }
    }

    fn block() -> BlockId {
        BlockId::new("data.tbl", 1)
    }

    #[test]
    fn commit_makes_changes_visible() {
        let engine = Engine::new();
        let mut tx1 = engine.begin(1);
        tx1.pin(&block()).unwrap();
        tx1.set_int(&block(), 80, 1, false).unwrap();
        tx1.set_string(&block(), 40, "one", false).unwrap();
        tx1.commit().unwrap();
        assert_eq!(tx1.state(), TransactionState::Committed);

        let mut tx2 = engine.begin(2);
        tx2.pin(&block()).unwrap();
        assert_eq!(tx2.get_int(&block(), 80).unwrap(), 1);
        assert_eq!(tx2.get_string(&block(), 40).unwrap(), "one");
        tx2.commit().unwrap();
    }

    #[test]
    fn rollback_restores_old_values() {
        let engine = Engine::new();
        let mut setup = engine.begin(1);
        setup.pin(&block()).unwrap();
        setup.set_int(&block(), 80, 1, false).unwrap();
        setup.set_string(&block(), 40, "one", false).unwrap();
        setup.commit().unwrap();

        let mut tx = engine.begin(2);
        tx.pin(&block()).unwrap();
        tx.set_int(&block(), 80, 2, true).unwrap();
        tx.set_string(&block(), 40, "two", true).unwrap();
        tx.set_int(&block(), 80, 3, true).unwrap();
        assert_eq!(tx.get_int(&block(), 80).unwrap(), 3);
        tx.rollback().unwrap();
        assert_eq!(tx.state(), TransactionState::RolledBack);
        assert_eq!(tx.pinned_count(), 0);
        assert_eq!(tx.held_locks(), 0);

        let mut check = engine.begin(3);
        check.pin(&block()).unwrap();
        assert_eq!(check.get_int(&block(), 80).unwrap(), 1);
        assert_eq!(check.get_string(&block(), 40).unwrap(), "one");
        check.commit().unwrap();
    }

    #[test]
    fn unlogged_writes_survive_rollback() {
        let engine = Engine::new();
        let mut tx = engine.begin(1);
        tx.pin(&block()).unwrap();
        tx.set_int(&block(), 80, 5, true).unwrap();
        tx.set_int(&block(), 120, 9, false).unwrap();
        tx.set_string(&block(), 40, "kept", false).unwrap();
        tx.rollback().unwrap();

        let mut check = engine.begin(2);
        check.pin(&block()).unwrap();
        assert_eq!(check.get_int(&block(), 80).unwrap(), 0);
        assert_eq!(check.get_int(&block(), 120).unwrap(), 9);
        assert_eq!(check.get_string(&block(), 40).unwrap(), "kept");
        check.commit().unwrap();
    }

    #[test]
    fn finished_transaction_rejects_work() {
        let engine = Engine::new();
        let mut tx = engine.begin(1);
        tx.commit().unwrap();
        let result = tx.pin(&block());
        assert!(matches!(
            result,
            Err(CoreError::TransactionNotActive {
                state: TransactionState::Committed,
                ..
            })
        ));
        assert!(tx.rollback().is_err());
    }

    #[test]
    fn access_requires_pin() {
        let engine = Engine::new();
        let mut tx = engine.begin(1);
        let result = tx.get_int(&block(), 0);
        assert!(matches!(result, Err(CoreError::BlockNotPinned { .. })));
        assert_eq!(tx.held_locks(), 0);
    }

    #[test]
    fn locks_follow_access_mode() {
        let engine = Engine::new();
        let mut tx = engine.begin(1);
        tx.pin(&block()).unwrap();
        tx.get_int(&block(), 0).unwrap();
        assert_eq!(tx.lock_mode(&block()), Some(LockMode::Shared));
        tx.set_int(&block(), 0, 5, true).unwrap();
        assert_eq!(tx.lock_mode(&block()), Some(LockMode::Exclusive));

        let mut other = engine.begin(2);
        other.pin(&block()).unwrap();
        assert!(other.get_int(&block(), 0).unwrap_err().is_timeout());

        tx.commit().unwrap();
        assert_eq!(other.get_int(&block(), 0).unwrap(), 5);
        other.commit().unwrap();
    }

    #[test]
    fn size_and_append_lock_end_of_file() {
        let engine = Engine::new();
        let mut tx = engine.begin(1);
        assert_eq!(tx.size("data.tbl").unwrap(), 0);
        let appended = tx.append("data.tbl").unwrap();
        assert_eq!(appended, BlockId::new("data.tbl", 0));
        assert_eq!(tx.size("data.tbl").unwrap(), 1);
        assert_eq!(
            tx.lock_mode(&BlockId::end_of_file("data.tbl")),
            Some(LockMode::Exclusive)
        );

        let mut other = engine.begin(2);
        assert!(other.size("data.tbl").unwrap_err().is_timeout());
        tx.commit().unwrap();
        assert_eq!(other.size("data.tbl").unwrap(), 1);
    }

    #[test]
    fn logged_writes_append_undo_records() {
        let engine = Engine::new();
        let mut tx = engine.begin(4);
        tx.pin(&block()).unwrap();
        tx.set_int(&block(), 0, 9, true).unwrap();
        tx.set_int(&block(), 4, 9, false).unwrap();

        let buffer = Arc::clone(tx.pins.buffer(&block()).unwrap());
        assert_eq!(buffer.lock().modifying_tx(), Some(TransactionId::new(4)));
        assert_eq!(buffer.lock().lsn(), engine.log.latest_lsn());

        let records: Vec<LogRecord> = engine
            .log
            .iter()
            .unwrap()
            .map(|bytes| LogRecord::decode(&bytes.unwrap()).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], LogRecord::SetInt { offset: 0, old_value: 0, .. }));
    }

    #[test]
    fn available_buffers_tracks_pool() {
        let engine = Engine::new();
        let mut tx = engine.begin(1);
        assert_eq!(tx.available_buffers(), 8);
        tx.pin(&block()).unwrap();
        tx.pin(&block()).unwrap();
        assert_eq!(tx.available_buffers(), 7);
        tx.rollback().unwrap();
        assert_eq!(engine.buffers.available(), 8);
        assert_eq!(tx.block_size(), 400);
    }
}
