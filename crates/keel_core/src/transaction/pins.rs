//! Per-transaction pin table.

use crate::buffer::{BufferManager, BufferRef};
use crate::error::{CoreError, CoreResult};
use keel_storage::BlockId;
use std::collections::HashMap;
use std::sync::Arc;

/// One pinned block as seen by the owning transaction.
struct Pinned {
    buffer: BufferRef,
    count: usize,
}

/// Blocks a transaction has pinned, with its own pin counts.
///
/// The transaction holds one pool pin per block no matter how often it pins
/// that block; the pool pin is released when the local count drops to zero.
/// A block is present iff the transaction holds at least one pin on it.
pub(crate) struct BufferList {
    buffers: Arc<BufferManager>,
    pins: HashMap<BlockId, Pinned>,
}

impl BufferList {
    pub(crate) fn new(buffers: Arc<BufferManager>) -> Self {
        Self {
            buffers,
            pins: HashMap::new(),
        }
    }

    pub(crate) fn buffer(&self, block: &BlockId) -> CoreResult<&BufferRef> {
        self.pins
            .get(block)
            .map(|pinned| &pinned.buffer)
            .ok_or_else(|| CoreError::BlockNotPinned {
                block: block.clone(),
            })
    }

    pub(crate) fn pin(&mut self, block: &BlockId) -> CoreResult<()> {
        if let Some(pinned) = self.pins.get_mut(block) {
            pinned.count += 1;
            return Ok(());
        }
        let buffer = self.buffers.pin(block)?;
        self.pins.insert(block.clone(), Pinned { buffer, count: 1 });
        Ok(())
    }

    pub(crate) fn unpin(&mut self, block: &BlockId) -> CoreResult<()> {
        let pinned = self
            .pins
            .get_mut(block)
            .ok_or_else(|| CoreError::BlockNotPinned {
                block: block.clone(),
            })?;
        pinned.count -= 1;
        if pinned.count == 0 {
            if let Some(pinned) = self.pins.remove(block) {
                self.buffers.unpin(&pinned.buffer);
            }
        }
        Ok(())
    }

    pub(crate) fn unpin_all(&mut self) {
        for (_, pinned) in self.pins.drain() {
            self.buffers.unpin(&pinned.buffer);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pins.len()
    }

    pub(crate) fn count(&self, block: &BlockId) -> usize {
        self.pins.get(block).map_or(0, |pinned| pinned.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogManager;
    use keel_storage::InMemoryBlockStore;
    use std::time::Duration;

    fn pool(count: usize) -> Arc<BufferManager> {
        let store = Arc::new(InMemoryBlockStore::new(64));
        let log = Arc::new(LogManager::new(store.clone(), "test.log").unwrap());
        Arc::new(BufferManager::new(store, log, count, Duration::from_millis(20)))
    }

    #[test]
    fn repeated_pins_hold_one_pool_pin() {
        let buffers = pool(2);
        let mut list = BufferList::new(Arc::clone(&buffers));
        let block = BlockId::new("t.tbl", 0);

        list.pin(&block).unwrap();
        list.pin(&block).unwrap();
        assert_eq!(list.count(&block), 2);
        assert_eq!(buffers.available(), 1);
        assert_eq!(list.buffer(&block).unwrap().lock().pin_count(), 1);

        list.unpin(&block).unwrap();
        assert_eq!(buffers.available(), 1);
        list.unpin(&block).unwrap();
        assert_eq!(buffers.available(), 2);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn unpin_of_unknown_block_fails() {
        let mut list = BufferList::new(pool(1));
        let result = list.unpin(&BlockId::new("t.tbl", 9));
        assert!(matches!(result, Err(CoreError::BlockNotPinned { .. })));
    }

    #[test]
    fn unpin_all_releases_pool() {
        let buffers = pool(3);
        let mut list = BufferList::new(Arc::clone(&buffers));
        list.pin(&BlockId::new("t.tbl", 0)).unwrap();
        list.pin(&BlockId::new("t.tbl", 1)).unwrap();
        list.pin(&BlockId::new("t.tbl", 1)).unwrap();

        list.unpin_all();
        assert_eq!(list.len(), 0);
        assert_eq!(buffers.available(), 3);
    }
}
