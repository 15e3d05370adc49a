//! Backward log iterator.
//!
//! Walks the log newest-first without holding the log manager's lock: the
//! manager flushes its tail before handing out an iterator, so every block
//! the iterator visits is already in the store.

use crate::error::CoreResult;
use crate::log::manager::boundary_of;
use keel_storage::{BlockId, BlockStore, Page, INT_SIZE};
use std::sync::Arc;
use tracing::warn;

/// A single-pass, newest-first iterator over raw log records.
///
/// Yields `Ok(bytes)` for each record and stops after block 0. Torn blocks
/// are skipped (see the module-level recovery policy); store failures are
/// yielded once as `Err` and end the iteration.
pub struct LogIterator {
    store: Arc<dyn BlockStore>,
    block: BlockId,
    page: Page,
    position: usize,
    finished: bool,
}

impl LogIterator {
    pub(crate) fn new(store: Arc<dyn BlockStore>, block: BlockId) -> CoreResult<Self> {
        let page = Page::new(store.block_size());
        let mut iter = Self {
            store,
            block: block.clone(),
            page,
            position: 0,
            finished: false,
        };
        iter.move_to(block)?;
        Ok(iter)
    }

    /// Walks the log as it is in the store, starting at its last block.
    ///
    /// Nothing is written. Records a live [`LogManager`](crate::LogManager)
    /// has not flushed yet are not seen.
    ///
    /// # Errors
    ///
    /// Returns an error if the log size or its last block cannot be read.
    pub fn on_disk(store: Arc<dyn BlockStore>, log_file: &str) -> CoreResult<Self> {
        let size = store.size(log_file)?;
        Self::new(store, BlockId::new(log_file, size.saturating_sub(1)))
    }

    /// Returns the block the iterator is currently reading.
    #[must_use]
    pub fn block(&self) -> &BlockId {
        &self.block
    }

    fn move_to(&mut self, block: BlockId) -> CoreResult<()> {
        self.store.read(&block, &mut self.page)?;
        let block_size = self.page.len();
        self.position = boundary_of(&self.page, block_size).unwrap_or_else(|| {
            warn!(%block, "log block has an invalid boundary, skipping it");
            block_size
        });
        self.block = block;
        Ok(())
    }

    fn next_record(&mut self) -> CoreResult<Option<Vec<u8>>> {
        let block_size = self.page.len();
        loop {
            if self.position >= block_size {
                if self.block.number() == 0 {
                    return Ok(None);
                }
                let previous = BlockId::new(self.block.filename(), self.block.number() - 1);
                self.move_to(previous)?;
                continue;
            }

            match self.record_len() {
                Some(len) => {
                    let start = self.position + INT_SIZE;
                    let record = self.page.contents()[start..start + len].to_vec();
                    self.position = start + len;
                    return Ok(Some(record));
                }
                None => {
                    warn!(
                        block = %self.block,
                        position = self.position,
                        "torn log record, skipping the rest of the block"
                    );
                    self.position = block_size;
                }
            }
        }
    }

    /// Length of the record at the current position, if its prefix is sane.
    fn record_len(&self) -> Option<usize> {
        let len = usize::try_from(self.page.get_int(self.position).ok()?).ok()?;
        let end = self.position.checked_add(INT_SIZE)?.checked_add(len)?;
        (len > 0 && end <= self.page.len()).then_some(len)
    }
}

impl Iterator for LogIterator {
    type Item = CoreResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for LogIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogIterator")
            .field("block", &self.block)
            .field("position", &self.position)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogManager;
    use crate::types::Lsn;
    use keel_storage::InMemoryBlockStore;

    const LOG: &str = "test.log";

    fn collect(iter: LogIterator) -> Vec<Vec<u8>> {
        iter.collect::<CoreResult<Vec<_>>>().unwrap()
    }

    #[test]
    fn empty_log_yields_nothing() {
        let store = Arc::new(InMemoryBlockStore::new(32));
        let log = LogManager::new(store, LOG).unwrap();
        assert!(collect(log.iter().unwrap()).is_empty());
    }

    #[test]
    fn iterator_is_single_pass() {
        let store = Arc::new(InMemoryBlockStore::new(32));
        let log = LogManager::new(store, LOG).unwrap();
        log.append(b"a").unwrap();

        let mut iter = log.iter().unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), b"a".to_vec());
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn later_appends_are_invisible_to_open_iterator() {
        let store = Arc::new(InMemoryBlockStore::new(64));
        let log = LogManager::new(store, LOG).unwrap();
        log.append(b"before").unwrap();

        let iter = log.iter().unwrap();
        log.append(b"after").unwrap();
        log.flush(Lsn::new(2)).unwrap();

        assert_eq!(collect(iter), vec![b"before".to_vec()]);
    }

    #[test]
    fn invalid_boundary_skips_block() {
        let store = Arc::new(InMemoryBlockStore::new(32));
        let log = LogManager::new(store.clone(), LOG).unwrap();
        log.append(b"kept").unwrap();
        log.flush(Lsn::new(1)).unwrap();

        // A second block whose header was torn.
        let block = store.append(LOG).unwrap();
        let mut page = Page::new(32);
        page.set_int(0, 9999).unwrap();
        store.write(&block, &page).unwrap();

        let iter = LogIterator::new(store, block).unwrap();
        assert_eq!(collect(iter), vec![b"kept".to_vec()]);
    }

    #[test]
    fn overrunning_length_prefix_skips_rest_of_block() {
        let store = Arc::new(InMemoryBlockStore::new(32));
        let block = store.append(LOG).unwrap();

        // Valid record at the end of the block, torn record at the boundary.
        let mut page = Page::new(32);
        page.set_bytes(25, b"ok!").unwrap();
        page.set_int(16, 500).unwrap();
        page.set_int(0, 16).unwrap();
        store.write(&block, &page).unwrap();

        let iter = LogIterator::new(store, block).unwrap();
        assert!(collect(iter).is_empty());
    }

    #[test]
    fn zero_length_prefix_is_torn() {
        let store = Arc::new(InMemoryBlockStore::new(32));
        let block = store.append(LOG).unwrap();

        let mut page = Page::new(32);
        page.set_int(0, 8).unwrap();
        store.write(&block, &page).unwrap();

        let iter = LogIterator::new(store, block).unwrap();
        assert!(collect(iter).is_empty());
    }
}
