//! Block store trait definition.

use crate::block::{BlockId, BlockNumber};
use crate::error::StorageResult;
use crate::page::Page;

/// A block-structured store of named files.
///
/// Block stores move whole blocks between disk and [`Page`]s. Keel owns all
/// interpretation of block contents - stores do not understand log records,
/// buffers, or locks.
///
/// # Invariants
///
/// - Every block of every file is exactly [`BlockStore::block_size`] bytes
/// - `read` of a block never written (or past the end of the file) zero-fills the page
/// - `write` persists the page, extending the file if needed
/// - `append` adds one zero-filled block past the current end and returns its id
/// - Implementations serialize concurrent access internally and are `Send + Sync`
///
/// # Implementors
///
/// - [`super::InMemoryBlockStore`] - For testing
/// - [`super::FileBlockStore`] - For persistent storage
pub trait BlockStore: Send + Sync {
    /// Fills `page` with the contents of `block`.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size differs from the block size or an
    /// I/O error occurs.
    fn read(&self, block: &BlockId, page: &mut Page) -> StorageResult<()>;

    /// Writes `page` to `block`.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size differs from the block size or an
    /// I/O error occurs.
    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()>;

    /// Appends a zero-filled block to `filename` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&self, filename: &str) -> StorageResult<BlockId>;

    /// Returns the number of blocks in `filename` (0 for a missing file).
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self, filename: &str) -> StorageResult<BlockNumber>;

    /// Returns the configured block size in bytes.
    fn block_size(&self) -> usize;
}
