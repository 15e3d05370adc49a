//! Database handle owning the shared engine objects.

use crate::buffer::BufferManager;
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::lock::LockTable;
use crate::log::LogManager;
use crate::recovery::LogRecord;
use crate::transaction::Transaction;
use crate::types::TransactionId;
use keel_storage::{BlockStore, FileBlockStore};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

/// The main database handle.
///
/// `Database` builds the objects every transaction shares: the block store,
/// the [`LogManager`], the [`BufferManager`] and the [`LockTable`]. It also
/// allocates transaction numbers. Nothing in this crate is a global, so two
/// databases in one process are fully independent.
///
/// # Opening a Database
///
/// ```rust,no_run
/// use keel_core::{Config, Database};
/// use keel_storage::BlockId;
/// use std::path::Path;
///
/// let db = Database::open(Path::new("my_database"), Config::default())?;
///
/// let mut tx = db.begin()?;
/// let block = tx.append("accounts.tbl")?;
/// tx.pin(&block)?;
/// tx.set_int(&block, 0, 100, true)?;
/// tx.commit()?;
/// # Ok::<(), keel_core::CoreError>(())
/// ```
///
/// # Crash Recovery
///
/// Recovery is explicit. After an unclean shutdown call
/// [`Database::recover`] before starting other transactions, or set
/// [`Config::recover_on_open`].
pub struct Database {
    config: Config,
    /// Holds the directory lock. `None` for stores not backed by a directory.
    dir: Option<DatabaseDir>,
    store: Arc<dyn BlockStore>,
    log: Arc<LogManager>,
    buffers: Arc<BufferManager>,
    lock_table: Arc<LockTable>,
    next_txnum: AtomicU32,
    is_new: bool,
}

impl Database {
    /// Opens or creates a database in the directory at `path`.
    ///
    /// The method:
    /// - Creates the directory if it doesn't exist (unless `create_if_missing` is false)
    /// - Acquires an exclusive lock to prevent concurrent access
    /// - Deletes leftover `temp*` files
    /// - Runs recovery if the database existed and `recover_on_open` is set
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the database locked (`DatabaseLocked`)
    /// - The directory is missing and may not be created (`InvalidFormat`)
    /// - The log cannot be read, or recovery fails
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, &config.log_file, config.create_if_missing)?;
        let store =
            FileBlockStore::open(path, config.block_size)?.with_sync_writes(config.sync_writes);
        let is_new = dir.is_new();

        let db = Self::build(Arc::new(store), config, Some(dir), is_new)?;
        info!(path = %path.display(), is_new, "database opened");

        if !is_new && db.config.recover_on_open {
            db.recover()?;
        }
        Ok(db)
    }

    /// Builds a database over an existing block store.
    ///
    /// The store's block size wins over `config.block_size`. Recovery is
    /// never run here, even with `recover_on_open` set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for an empty pool, or an error if the log
    /// cannot be read.
    pub fn with_store(store: Arc<dyn BlockStore>, mut config: Config) -> CoreResult<Self> {
        config.block_size = store.block_size();
        let is_new = store.size(&config.log_file)? == 0;
        Self::build(store, config, None, is_new)
    }

    fn build(
        store: Arc<dyn BlockStore>,
        config: Config,
        dir: Option<DatabaseDir>,
        is_new: bool,
    ) -> CoreResult<Self> {
        if config.buffer_count == 0 {
            return Err(CoreError::invalid_format("buffer pool must hold at least one buffer"));
        }

        let log = Arc::new(LogManager::new(Arc::clone(&store), config.log_file.clone())?);
        let first_txnum = next_txnum_after(&log)?;
        let buffers = Arc::new(BufferManager::new(
            Arc::clone(&store),
            Arc::clone(&log),
            config.buffer_count,
            config.buffer_wait,
        ));
        let lock_table = Arc::new(LockTable::new(config.lock_wait));

        Ok(Self {
            config,
            dir,
            store,
            log,
            buffers,
            lock_table,
            next_txnum: AtomicU32::new(first_txnum),
            is_new,
        })
    }

    /// Begins a new transaction with the next transaction number.
    ///
    /// # Errors
    ///
    /// Returns an error if the `START` record cannot be logged.
    pub fn begin(&self) -> CoreResult<Transaction> {
        let txnum = TransactionId::new(self.next_txnum.fetch_add(1, Ordering::SeqCst));
        Transaction::new(
            txnum,
            Arc::clone(&self.store),
            Arc::clone(&self.log),
            Arc::clone(&self.buffers),
            Arc::clone(&self.lock_table),
        )
    }

    /// Runs recovery in a fresh transaction and commits it.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or an undo fails.
    pub fn recover(&self) -> CoreResult<()> {
        let mut tx = self.begin()?;
        tx.recover()?;
        tx.commit()
    }

    /// Returns true if the database had no log when it was opened.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Returns the database directory, if the store is backed by one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns the configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the log manager.
    #[must_use]
    pub fn log(&self) -> &Arc<LogManager> {
        &self.log
    }

    /// Returns the buffer manager.
    #[must_use]
    pub fn buffers(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    /// Returns the lock table.
    #[must_use]
    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lock_table
    }

    /// Returns the block store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }
}

/// First transaction number above every number still visible to recovery.
///
/// Only records newer than the last checkpoint matter, so the scan stops there.
fn next_txnum_after(log: &LogManager) -> CoreResult<u32> {
    let mut highest = 0u32;
    for bytes in log.iter()? {
        let record = LogRecord::decode(&bytes?)?;
        if record == LogRecord::Checkpoint {
            break;
        }
        if let Some(txnum) = record.txnum() {
            highest = highest.max(txnum.as_u32());
        }
    }
    highest
        .checked_add(1)
        .ok_or_else(|| CoreError::invalid_format("transaction numbers exhausted"))
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("is_new", &self.is_new)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_storage::{BlockId, InMemoryBlockStore};
    use std::time::Duration;
    use tempfile::tempdir;

    fn small_config() -> Config {
        Config::new()
            .block_size(400)
            .buffer_count(4)
            .buffer_wait(Duration::from_millis(50))
            .lock_wait(Duration::from_millis(50))
            .sync_writes(false)
    }

    #[test]
    fn transaction_numbers_increase() {
        let db = Database::with_store(Arc::new(InMemoryBlockStore::new(400)), small_config())
            .unwrap();
        assert!(db.is_new());
        let first = db.begin().unwrap();
        let second = db.begin().unwrap();
        assert_eq!(first.txnum(), TransactionId::new(1));
        assert_eq!(second.txnum(), TransactionId::new(2));
    }

    #[test]
    fn with_store_uses_store_block_size() {
        let db = Database::with_store(
            Arc::new(InMemoryBlockStore::new(128)),
            small_config().block_size(4096),
        )
        .unwrap();
        assert_eq!(db.config().block_size, 128);
        assert!(db.path().is_none());
    }

    #[test]
    fn empty_pool_is_rejected() {
        let result = Database::with_store(
            Arc::new(InMemoryBlockStore::new(400)),
            small_config().buffer_count(0),
        );
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn reopen_sees_committed_data() {
        let temp = tempdir().unwrap();
        let block = BlockId::new("data.tbl", 0);
        {
            let db = Database::open(temp.path(), small_config()).unwrap();
            assert!(db.is_new());
            let mut tx = db.begin().unwrap();
            tx.append("data.tbl").unwrap();
            tx.pin(&block).unwrap();
            tx.set_string(&block, 0, "persisted", true).unwrap();
            tx.commit().unwrap();
        }

        let db = Database::open(temp.path(), small_config()).unwrap();
        assert!(!db.is_new());
        let mut tx = db.begin().unwrap();
        assert!(tx.txnum() > TransactionId::new(1));
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_string(&block, 0).unwrap(), "persisted");
        tx.commit().unwrap();
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _db = Database::open(temp.path(), small_config()).unwrap();
        let second = Database::open(temp.path(), small_config());
        assert!(matches!(second, Err(CoreError::DatabaseLocked)));
    }

    #[test]
    fn recover_on_open_undoes_unfinished_work() {
        let temp = tempdir().unwrap();
        let block = BlockId::new("data.tbl", 0);
        {
            let db = Database::open(temp.path(), small_config()).unwrap();
            let mut setup = db.begin().unwrap();
            setup.pin(&block).unwrap();
            setup.set_int(&block, 0, 7, true).unwrap();
            setup.commit().unwrap();

            let mut crashed = db.begin().unwrap();
            crashed.pin(&block).unwrap();
            crashed.set_int(&block, 0, 99, true).unwrap();
            // Force the dirty page out without finishing the transaction.
            db.buffers().flush_all_modified().unwrap();
        }

        let db = Database::open(temp.path(), small_config().recover_on_open(true)).unwrap();
        let mut tx = db.begin().unwrap();
        tx.pin(&block).unwrap();
        assert_eq!(tx.get_int(&block, 0).unwrap(), 7);
        tx.commit().unwrap();
    }
}
