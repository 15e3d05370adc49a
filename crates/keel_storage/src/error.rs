//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A page accessor reached past the end of the page.
    #[error("page access out of bounds: offset {offset}, len {len}, page size {size}")]
    OutOfBounds {
        /// The requested offset.
        offset: usize,
        /// The number of bytes the access needed.
        len: usize,
        /// The page size.
        size: usize,
    },

    /// A stored string was not valid UTF-8.
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 {
        /// Offset of the length prefix.
        offset: usize,
    },

    /// A page of the wrong size was handed to the store.
    #[error("page size mismatch: store uses {expected}-byte blocks, page has {actual} bytes")]
    BlockSizeMismatch {
        /// The store's block size.
        expected: usize,
        /// The page's size.
        actual: usize,
    },

    /// A store was opened with a block size of zero.
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// The store's files are damaged.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
