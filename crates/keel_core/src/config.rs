//! Database configuration.

use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size of every block (data and log) in bytes.
    pub block_size: usize,

    /// Number of buffers in the pool.
    pub buffer_count: usize,

    /// Name of the log file inside the database directory.
    pub log_file: String,

    /// How long a pin waits for an unpinned buffer before aborting.
    pub buffer_wait: Duration,

    /// How long a lock request waits before aborting.
    pub lock_wait: Duration,

    /// Whether the file store syncs each block write to disk.
    pub sync_writes: bool,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether opening an existing database runs recovery.
    pub recover_on_open: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: 4096,
            buffer_count: 8,
            log_file: "keel.log".to_string(),
            buffer_wait: Duration::from_secs(10),
            lock_wait: Duration::from_secs(10),
            sync_writes: true,
            create_if_missing: true,
            recover_on_open: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    #[must_use]
    pub const fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the number of buffers in the pool.
    #[must_use]
    pub const fn buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Sets the log file name.
    #[must_use]
    pub fn log_file(mut self, name: impl Into<String>) -> Self {
        self.log_file = name.into();
        self
    }

    /// Sets the buffer wait threshold.
    #[must_use]
    pub const fn buffer_wait(mut self, wait: Duration) -> Self {
        self.buffer_wait = wait;
        self
    }

    /// Sets the lock wait threshold.
    #[must_use]
    pub const fn lock_wait(mut self, wait: Duration) -> Self {
        self.lock_wait = wait;
        self
    }

    /// Sets whether block writes are synced to disk.
    #[must_use]
    pub const fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether opening an existing database runs recovery.
    #[must_use]
    pub const fn recover_on_open(mut self, value: bool) -> Self {
        self.recover_on_open = value;
        self
    }
}
