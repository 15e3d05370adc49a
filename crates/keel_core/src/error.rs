//! Error types for Keel core.

use crate::lock::LockMode;
use crate::transaction::TransactionState;
use crate::types::TransactionId;
use keel_storage::BlockId;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Keel core operations.
///
/// Timeouts and storage failures are fatal for the call that hit them: the
/// caller should treat its transaction as dead and roll it back. Nothing in
/// this crate rolls back automatically.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Block store error.
    #[error("storage error: {0}")]
    Storage(#[from] keel_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No buffer became available within the wait threshold.
    #[error("buffer abort: no unpinned buffer after {waited:?}")]
    BufferAbort {
        /// How long the pin waited.
        waited: Duration,
    },

    /// A lock request was not granted within the wait threshold.
    #[error("lock abort: {mode:?} lock on {block} not granted after {waited:?}")]
    LockAbort {
        /// The contended block.
        block: BlockId,
        /// The requested mode.
        mode: LockMode,
        /// How long the request waited.
        waited: Duration,
    },

    /// A log record does not fit in a single log block.
    #[error("log record of {size} bytes exceeds the maximum of {max} bytes")]
    LogRecordTooLarge {
        /// Encoded record size.
        size: usize,
        /// Largest record a log block can hold.
        max: usize,
    },

    /// The log is corrupted or invalid.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The transaction has no pin on the block it tried to use.
    #[error("block {block} is not pinned by this transaction")]
    BlockNotPinned {
        /// The block that was accessed.
        block: BlockId,
    },

    /// Operation attempted on a finished transaction.
    #[error("{txnum} is not active (state: {state:?})")]
    TransactionNotActive {
        /// The transaction.
        txnum: TransactionId,
        /// Its current state.
        state: TransactionState,
    },

    /// Database directory is locked by another process.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database layout or configuration.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl CoreError {
    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Returns true for the timeout errors (`BufferAbort`, `LockAbort`).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::BufferAbort { .. } | Self::LockAbort { .. })
    }
}
