//! In-memory block store for testing.

use crate::block::{BlockId, BlockNumber};
use crate::error::{StorageError, StorageResult};
use crate::page::Page;
use crate::store::BlockStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory block store.
///
/// This store keeps every file as a vector of blocks and is suitable for:
/// - Unit tests
/// - Integration tests (including simulated restarts, since the store
///   outlives the managers built on top of it)
/// - Ephemeral engines that don't need persistence
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use keel_storage::{BlockStore, InMemoryBlockStore};
///
/// let store = InMemoryBlockStore::new(128);
/// let block = store.append("t.tbl").unwrap();
/// assert_eq!(block.number(), 0);
/// assert_eq!(store.size("t.tbl").unwrap(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryBlockStore {
    block_size: usize,
    files: RwLock<HashMap<String, Vec<Vec<u8>>>>,
}

impl InMemoryBlockStore {
    /// Creates a new empty store with the given block size.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the names of all files in the store, sorted.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns a copy of one block's bytes, if the block exists.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn raw_block(&self, block: &BlockId) -> Option<Vec<u8>> {
        self.files
            .read()
            .get(block.filename())
            .and_then(|blocks| blocks.get(block.number() as usize))
            .cloned()
    }

    fn check_page(&self, page: &Page) -> StorageResult<()> {
        if page.len() != self.block_size {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.block_size,
                actual: page.len(),
            });
        }
        Ok(())
    }
}

impl BlockStore for InMemoryBlockStore {
    fn read(&self, block: &BlockId, page: &mut Page) -> StorageResult<()> {
        self.check_page(page)?;
        match self.raw_block(block) {
            Some(bytes) => page.contents_mut().copy_from_slice(&bytes),
            None => page.clear(),
        }
        Ok(())
    }

    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        self.check_page(page)?;
        let mut files = self.files.write();
        let blocks = files.entry(block.filename().to_string()).or_default();
        let index = block.number() as usize;
        if blocks.len() <= index {
            blocks.resize(index + 1, vec![0; self.block_size]);
        }
        blocks[index].copy_from_slice(page.contents());
        Ok(())
    }

    fn append(&self, filename: &str) -> StorageResult<BlockId> {
        let mut files = self.files.write();
        let blocks = files.entry(filename.to_string()).or_default();
        let number = BlockNumber::try_from(blocks.len())
            .map_err(|_| StorageError::Corrupted(format!("file {filename} is full")))?;
        blocks.push(vec![0; self.block_size]);
        Ok(BlockId::new(filename, number))
    }

    fn size(&self, filename: &str) -> StorageResult<BlockNumber> {
        let len = self.files.read().get(filename).map_or(0, Vec::len);
        BlockNumber::try_from(len)
            .map_err(|_| StorageError::Corrupted(format!("file {filename} is too large")))
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryBlockStore::new(16);
        assert_eq!(store.size("a").unwrap(), 0);
        assert!(store.files().is_empty());
    }

    #[test]
    fn memory_append_returns_next_block() {
        let store = InMemoryBlockStore::new(16);
        assert_eq!(store.append("a").unwrap(), BlockId::new("a", 0));
        assert_eq!(store.append("a").unwrap(), BlockId::new("a", 1));
        assert_eq!(store.append("b").unwrap(), BlockId::new("b", 0));
        assert_eq!(store.size("a").unwrap(), 2);
        assert_eq!(store.files(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn memory_write_and_read() {
        let store = InMemoryBlockStore::new(16);
        let block = BlockId::new("a", 0);
        let mut page = Page::new(16);
        page.set_string(0, "hi").unwrap();
        store.write(&block, &page).unwrap();

        let mut out = Page::new(16);
        store.read(&block, &mut out).unwrap();
        assert_eq!(out.get_string(0).unwrap(), "hi");
    }

    #[test]
    fn memory_write_past_end_extends_file() {
        let store = InMemoryBlockStore::new(16);
        store.write(&BlockId::new("a", 3), &Page::new(16)).unwrap();
        assert_eq!(store.size("a").unwrap(), 4);
    }

    #[test]
    fn memory_read_missing_block_zero_fills() {
        let store = InMemoryBlockStore::new(16);
        let mut page = Page::new(16);
        page.set_int(0, 9).unwrap();
        store.read(&BlockId::new("nope", 5), &mut page).unwrap();
        assert_eq!(page.get_int(0).unwrap(), 0);
    }

    #[test]
    fn memory_wrong_page_size_fails() {
        let store = InMemoryBlockStore::new(16);
        let result = store.write(&BlockId::new("a", 0), &Page::new(8));
        assert!(matches!(
            result,
            Err(StorageError::BlockSizeMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }
}
