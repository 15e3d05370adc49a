//! Log writer.

use crate::error::{CoreError, CoreResult};
use crate::log::LogIterator;
use crate::types::Lsn;
use keel_storage::{BlockId, BlockStore, Page, INT_SIZE};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Manages appends to the log and its tail block.
///
/// The `LogManager` buffers the tail block in memory. Appends only touch
/// that page; [`LogManager::flush`] writes it to the store. All calls are
/// serialized by one internal lock.
pub struct LogManager {
    store: Arc<dyn BlockStore>,
    log_file: String,
    block_size: usize,
    state: Mutex<LogState>,
}

struct LogState {
    page: Page,
    current: BlockId,
    latest_lsn: u64,
    last_saved_lsn: u64,
}

impl LogManager {
    /// Opens the log file, creating its first block if the file is empty.
    ///
    /// An existing log continues in its last block. If that block's boundary
    /// is unreadable (torn by a crash), appends start in a fresh block.
    ///
    /// # Errors
    ///
    /// Returns an error if the block size cannot hold a record or the store fails.
    pub fn new(store: Arc<dyn BlockStore>, log_file: impl Into<String>) -> CoreResult<Self> {
        let log_file = log_file.into();
        let block_size = store.block_size();
        if block_size <= 2 * INT_SIZE || i32::try_from(block_size).is_err() {
            return Err(CoreError::invalid_format(format!(
                "block size {block_size} cannot hold log records"
            )));
        }

        let size = store.size(&log_file)?;
        let (current, page) = if size == 0 {
            append_new_block(store.as_ref(), &log_file)?
        } else {
            let block = BlockId::new(log_file.as_str(), size - 1);
            let mut page = Page::new(block_size);
            store.read(&block, &mut page)?;
            if boundary_of(&page, block_size).is_some() {
                (block, page)
            } else {
                debug!(%block, "tail log block has no valid boundary, starting a new one");
                append_new_block(store.as_ref(), &log_file)?
            }
        };

        Ok(Self {
            store,
            log_file,
            block_size,
            state: Mutex::new(LogState {
                page,
                current,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Largest record (excluding its length prefix) a log block can hold.
    #[must_use]
    pub fn max_record_size(&self) -> usize {
        self.block_size - 2 * INT_SIZE
    }

    /// Appends a record to the tail block and returns its LSN.
    ///
    /// The record is not durable until a [`LogManager::flush`] covering its LSN.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The record is empty or larger than [`LogManager::max_record_size`]
    /// - The store fails while moving to a new block
    pub fn append(&self, record: &[u8]) -> CoreResult<Lsn> {
        if record.is_empty() {
            return Err(CoreError::invalid_format("log records must not be empty"));
        }
        if record.len() > self.max_record_size() {
            return Err(CoreError::LogRecordTooLarge {
                size: record.len(),
                max: self.max_record_size(),
            });
        }

        let needed = Page::max_length(record.len());
        let mut state = self.state.lock();
        let mut boundary = boundary_of(&state.page, self.block_size).unwrap_or(INT_SIZE);
        if boundary < needed + INT_SIZE {
            self.flush_locked(&mut state)?;
            // The tail page stays bound to the old block until the new one is on disk.
            let (current, page) = append_new_block(self.store.as_ref(), &self.log_file)?;
            debug!(block = %current, "log moved to new block");
            state.current = current;
            state.page = page;
            boundary = self.block_size;
        }

        let position = boundary - needed;
        state.page.set_bytes(position, record)?;
        state.page.set_int(0, to_i32(position))?;
        state.latest_lsn += 1;
        Ok(Lsn::new(state.latest_lsn))
    }

    /// Makes the log durable up to and including `lsn`.
    ///
    /// Does nothing if every record up to `lsn` was already written.
    ///
    /// # Errors
    ///
    /// Returns an error if the tail block cannot be written.
    pub fn flush(&self, lsn: Lsn) -> CoreResult<()> {
        let mut state = self.state.lock();
        if lsn.as_u64() >= state.last_saved_lsn {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    /// Returns a newest-first iterator over the raw records of the whole log.
    ///
    /// The tail block is flushed first, so the iterator sees every record
    /// appended before this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or the first block read fails.
    pub fn iter(&self) -> CoreResult<LogIterator> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)?;
        LogIterator::new(Arc::clone(&self.store), state.current.clone())
    }

    /// LSN of the most recent append, if any.
    #[must_use]
    pub fn latest_lsn(&self) -> Option<Lsn> {
        non_zero(self.state.lock().latest_lsn)
    }

    /// LSN of the most recent record known to be durable, if any.
    #[must_use]
    pub fn last_saved_lsn(&self) -> Option<Lsn> {
        non_zero(self.state.lock().last_saved_lsn)
    }

    /// Returns the block currently receiving appends.
    #[must_use]
    pub fn current_block(&self) -> BlockId {
        self.state.lock().current.clone()
    }

    /// Returns the log file name.
    #[must_use]
    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    fn flush_locked(&self, state: &mut LogState) -> CoreResult<()> {
        self.store.write(&state.current, &state.page)?;
        state.last_saved_lsn = state.latest_lsn;
        Ok(())
    }
}

impl std::fmt::Debug for LogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LogManager")
            .field("log_file", &self.log_file)
            .field("current", &state.current)
            .field("latest_lsn", &state.latest_lsn)
            .field("last_saved_lsn", &state.last_saved_lsn)
            .finish_non_exhaustive()
    }
}

/// Reads a block's boundary, or `None` if it is out of range.
pub(crate) fn boundary_of(page: &Page, block_size: usize) -> Option<usize> {
    let boundary = usize::try_from(page.get_int(0).ok()?).ok()?;
    (INT_SIZE..=block_size).contains(&boundary).then_some(boundary)
}

/// Appends an empty block to the log and writes its boundary.
fn append_new_block(store: &dyn BlockStore, log_file: &str) -> CoreResult<(BlockId, Page)> {
    let block = store.append(log_file)?;
    let mut page = Page::new(store.block_size());
    page.set_int(0, to_i32(page.len()))?;
    store.write(&block, &page)?;
    Ok((block, page))
}

// Offsets are bounded by the block size, which `LogManager::new` checked fits in an i32.
fn to_i32(offset: usize) -> i32 {
    i32::try_from(offset).unwrap_or(i32::MAX)
}

fn non_zero(lsn: u64) -> Option<Lsn> {
    (lsn != 0).then_some(Lsn::new(lsn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_storage::InMemoryBlockStore;

    const LOG: &str = "test.log";

    fn create_log(block_size: usize) -> (Arc<InMemoryBlockStore>, LogManager) {
        let store = Arc::new(InMemoryBlockStore::new(block_size));
        let log = LogManager::new(store.clone(), LOG).unwrap();
        (store, log)
    }

    fn records(log: &LogManager) -> Vec<Vec<u8>> {
        log.iter().unwrap().collect::<CoreResult<Vec<_>>>().unwrap()
    }

    #[test]
    fn new_log_has_one_empty_block() {
        let (store, log) = create_log(16);
        assert_eq!(store.size(LOG).unwrap(), 1);
        assert_eq!(log.latest_lsn(), None);
        assert_eq!(log.last_saved_lsn(), None);
        assert!(records(&log).is_empty());
    }

    #[test]
    fn boundary_moves_toward_front() {
        let (store, log) = create_log(16);

        assert_eq!(log.append(b"test").unwrap(), Lsn::new(1));
        log.flush(Lsn::new(1)).unwrap();
        let block = store.raw_block(&BlockId::new(LOG, 0)).unwrap();
        assert_eq!(Page::from_bytes(block).get_int(0).unwrap(), 8);

        assert_eq!(log.append(b"test2").unwrap(), Lsn::new(2));
        assert_eq!(log.current_block(), BlockId::new(LOG, 1));
        assert_eq!(log.latest_lsn(), Some(Lsn::new(2)));
        assert_eq!(log.last_saved_lsn(), Some(Lsn::new(1)));

        log.flush(Lsn::new(2)).unwrap();
        let block = store.raw_block(&BlockId::new(LOG, 1)).unwrap();
        assert_eq!(Page::from_bytes(block).get_int(0).unwrap(), 7);
    }

    #[test]
    fn iterates_newest_first_across_blocks() {
        let (_store, log) = create_log(32);
        for i in 0..10u8 {
            log.append(&[i; 5]).unwrap();
        }

        let all = records(&log);
        let expected: Vec<Vec<u8>> = (0..10u8).rev().map(|i| vec![i; 5]).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn iter_flushes_tail() {
        let (_store, log) = create_log(64);
        log.append(b"abc").unwrap();
        assert_eq!(log.last_saved_lsn(), None);
        let _ = log.iter().unwrap();
        assert_eq!(log.last_saved_lsn(), Some(Lsn::new(1)));
    }

    #[test]
    fn flush_below_saved_lsn_is_noop() {
        let (store, log) = create_log(64);
        log.append(b"one").unwrap();
        log.flush(Lsn::new(1)).unwrap();
        log.append(b"two").unwrap();

        // LSN 0 is below the saved LSN, so the second record stays in memory.
        log.flush(Lsn::new(0)).unwrap();
        assert_eq!(log.last_saved_lsn(), Some(Lsn::new(1)));

        let reopened = LogManager::new(store, LOG).unwrap();
        assert_eq!(records(&reopened), vec![b"one".to_vec()]);
    }

    #[test]
    fn oversized_record_rejected() {
        let (_store, log) = create_log(16);
        assert_eq!(log.max_record_size(), 8);
        assert!(log.append(&[1; 8]).is_ok());
        assert!(matches!(
            log.append(&[1; 9]),
            Err(CoreError::LogRecordTooLarge { size: 9, max: 8 })
        ));
    }

    #[test]
    fn empty_record_rejected() {
        let (_store, log) = create_log(16);
        assert!(log.append(&[]).is_err());
        assert_eq!(log.latest_lsn(), None);
    }

    #[test]
    fn reopened_log_continues_in_last_block() {
        let (store, log) = create_log(32);
        log.append(b"first").unwrap();
        log.flush(Lsn::new(1)).unwrap();
        drop(log);

        let log = LogManager::new(store.clone(), LOG).unwrap();
        log.append(b"second").unwrap();
        assert_eq!(store.size(LOG).unwrap(), 1);
        assert_eq!(records(&log), vec![b"second".to_vec(), b"first".to_vec()]);
    }

    #[test]
    fn tiny_block_size_rejected() {
        let store = Arc::new(InMemoryBlockStore::new(8));
        assert!(LogManager::new(store, LOG).is_err());
    }
}
