//! Per-transaction lock bookkeeping.

use crate::error::CoreResult;
use crate::lock::{LockMode, LockTable};
use keel_storage::BlockId;
use std::collections::HashMap;
use std::sync::Arc;

/// Tracks the locks one transaction holds in the shared [`LockTable`].
pub struct ConcurrencyManager {
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockMode>,
}

impl ConcurrencyManager {
    /// Creates a manager holding no locks.
    #[must_use]
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        Self {
            lock_table,
            locks: HashMap::new(),
        }
    }

    /// Acquires a shared lock unless the transaction already holds any lock on `block`.
    ///
    /// # Errors
    ///
    /// Returns `LockAbort` if the lock table times out.
    pub fn slock(&mut self, block: &BlockId) -> CoreResult<()> {
        if !self.locks.contains_key(block) {
            self.lock_table.slock(block)?;
            self.locks.insert(block.clone(), LockMode::Shared);
        }
        Ok(())
    }

    /// Acquires an exclusive lock, taking a shared lock first and upgrading it.
    ///
    /// # Errors
    ///
    /// Returns `LockAbort` if the lock table times out. A shared lock
    /// obtained on the way stays held until [`ConcurrencyManager::release`].
    pub fn xlock(&mut self, block: &BlockId) -> CoreResult<()> {
        if self.holds(block) == Some(LockMode::Exclusive) {
            return Ok(());
        }
        self.slock(block)?;
        self.lock_table.xlock(block)?;
        self.locks.insert(block.clone(), LockMode::Exclusive);
        Ok(())
    }

    /// Releases every lock held, one unlock per block.
    pub fn release(&mut self) {
        for block in self.locks.keys() {
            self.lock_table.unlock(block);
        }
        self.locks.clear();
    }

    /// Returns the mode held on `block`, if any.
    #[must_use]
    pub fn holds(&self, block: &BlockId) -> Option<LockMode> {
        self.locks.get(block).copied()
    }

    /// Returns the number of blocks locked by this transaction.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.locks.len()
    }
}

impl std::fmt::Debug for ConcurrencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyManager")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockState;
    use std::time::Duration;

    fn table() -> Arc<LockTable> {
        Arc::new(LockTable::new(Duration::from_millis(20)))
    }

    #[test]
    fn repeated_slock_hits_table_once() {
        let table = table();
        let mut cm = ConcurrencyManager::new(Arc::clone(&table));
        let block = BlockId::new("t.tbl", 0);
        cm.slock(&block).unwrap();
        cm.slock(&block).unwrap();
        assert_eq!(table.holders(&block), Some(LockState::Shared(1)));
    }

    #[test]
    fn xlock_upgrades_shared() {
        let table = table();
        let mut cm = ConcurrencyManager::new(Arc::clone(&table));
        let block = BlockId::new("t.tbl", 0);
        cm.slock(&block).unwrap();
        cm.xlock(&block).unwrap();
        assert_eq!(cm.holds(&block), Some(LockMode::Exclusive));
        assert_eq!(table.holders(&block), Some(LockState::Exclusive));

        // Already exclusive: reads and writes stay local.
        cm.slock(&block).unwrap();
        cm.xlock(&block).unwrap();
        assert_eq!(cm.held_count(), 1);
    }

    #[test]
    fn release_frees_every_block() {
        let table = table();
        let mut cm = ConcurrencyManager::new(Arc::clone(&table));
        cm.slock(&BlockId::new("t.tbl", 0)).unwrap();
        cm.xlock(&BlockId::new("t.tbl", 1)).unwrap();
        cm.slock(&BlockId::end_of_file("t.tbl")).unwrap();

        cm.release();
        assert_eq!(cm.held_count(), 0);
        assert_eq!(table.locked_count(), 0);
    }

    #[test]
    fn writer_excludes_other_transaction() {
        let table = table();
        let mut writer = ConcurrencyManager::new(Arc::clone(&table));
        let mut reader = ConcurrencyManager::new(Arc::clone(&table));
        let block = BlockId::new("t.tbl", 0);

        writer.xlock(&block).unwrap();
        assert!(reader.slock(&block).unwrap_err().is_timeout());
        assert_eq!(reader.held_count(), 0);

        writer.release();
        reader.slock(&block).unwrap();
    }

    #[test]
    fn two_readers_cannot_both_upgrade() {
        let table = table();
        let mut a = ConcurrencyManager::new(Arc::clone(&table));
        let mut b = ConcurrencyManager::new(Arc::clone(&table));
        let block = BlockId::new("t.tbl", 0);
        a.slock(&block).unwrap();
        b.slock(&block).unwrap();

        assert!(a.xlock(&block).unwrap_err().is_timeout());
        assert_eq!(a.holds(&block), Some(LockMode::Shared));

        b.release();
        a.xlock(&block).unwrap();
    }
}
