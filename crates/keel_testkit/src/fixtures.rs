//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and simulating a process restart.

use keel_core::{Config, Database};
use keel_storage::{BlockStore, InMemoryBlockStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Block size used by test databases.
pub const TEST_BLOCK_SIZE: usize = 400;

/// Configuration for test databases: small blocks and short waits.
pub fn test_config() -> Config {
    Config::new()
        .block_size(TEST_BLOCK_SIZE)
        .buffer_count(8)
        .buffer_wait(Duration::from_millis(200))
        .lock_wait(Duration::from_millis(200))
        .sync_writes(false)
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    store: Arc<dyn BlockStore>,
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with(test_config())
    }

    /// Creates a new in-memory test database with a custom configuration.
    pub fn memory_with(config: Config) -> Self {
        Self::with_store(Arc::new(InMemoryBlockStore::new(config.block_size)), config)
    }

    /// Creates a test database over an existing store.
    pub fn with_store(store: Arc<dyn BlockStore>, config: Config) -> Self {
        let db = Database::with_store(Arc::clone(&store), config.clone())
            .expect("Failed to open database over store");
        Self {
            db,
            store,
            config,
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = test_config();
        let db = Database::open(temp_dir.path(), config.clone()).expect("Failed to open file database");
        let store = Arc::clone(db.store());
        Self {
            db,
            store,
            config,
            temp_dir: Some(temp_dir),
        }
    }

    /// Simulates a crash and restart.
    ///
    /// The database is dropped without committing or rolling back anything,
    /// so buffered pages and the unflushed log tail are lost. A new
    /// database is then opened over the same storage. Recovery is not run.
    pub fn restart(self) -> Self {
        let Self {
            db,
            store,
            config,
            temp_dir,
        } = self;
        drop(db);

        match temp_dir {
            Some(temp_dir) => {
                let db = Database::open(temp_dir.path(), config.clone().recover_on_open(false))
                    .expect("Failed to reopen file database");
                let store = Arc::clone(db.store());
                Self {
                    db,
                    store,
                    config,
                    temp_dir: Some(temp_dir),
                }
            }
            None => Self::with_store(store, config),
        }
    }

    /// Returns the underlying block store.
    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path").to_path_buf();
    f(&test_db.db, &path)
}
