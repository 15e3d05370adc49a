//! Buffer pool manager.

use crate::buffer::Buffer;
use crate::error::{CoreError, CoreResult};
use crate::log::LogManager;
use crate::types::TransactionId;
use keel_storage::{BlockId, BlockStore};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared handle to one buffer of the pool.
pub type BufferRef = Arc<Mutex<Buffer>>;

/// Manages the pool of buffers shared by all transactions.
///
/// The buffer manager provides:
/// - Pin/unpin with per-buffer reference counts
/// - Bounded waiting when every buffer is pinned
/// - Commit-time flushing of a transaction's dirty buffers
///
/// ## Lock Order
///
/// The pool lock is always taken before any buffer lock. Callers reading or
/// writing a page lock only that buffer and never call back into the pool
/// while holding it.
pub struct BufferManager {
    pool: Vec<BufferRef>,
    state: Mutex<PoolState>,
    unpinned: Condvar,
    max_wait: Duration,
}

struct PoolState {
    available: usize,
    /// Which slot holds each resident block.
    resident: HashMap<BlockId, usize>,
    /// Slot where the next replacement scan starts.
    clock: usize,
}

impl BufferManager {
    /// Creates a pool of `count` buffers.
    pub fn new(
        store: Arc<dyn BlockStore>,
        log: Arc<LogManager>,
        count: usize,
        max_wait: Duration,
    ) -> Self {
        let pool = (0..count)
            .map(|_| Arc::new(Mutex::new(Buffer::new(Arc::clone(&store), Arc::clone(&log)))))
            .collect();
        Self {
            pool,
            state: Mutex::new(PoolState {
                available: count,
                resident: HashMap::new(),
                clock: 0,
            }),
            unpinned: Condvar::new(),
            max_wait,
        }
    }

    /// Returns the number of unpinned buffers.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().available
    }

    /// Returns the total number of buffers in the pool.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.len()
    }

    /// Pins a buffer holding `block`.
    ///
    /// A resident block is pinned again in place. Otherwise an unpinned
    /// buffer is flushed and loaded with `block`. If none is free, the call
    /// waits for an unpin.
    ///
    /// # Errors
    ///
    /// Returns `BufferAbort` if no buffer is freed within the wait threshold,
    /// or a storage error from flushing or loading.
    pub fn pin(&self, block: &BlockId) -> CoreResult<BufferRef> {
        let deadline = Instant::now() + self.max_wait;
        let mut state = self.state.lock();
        loop {
            if let Some(buffer) = self.try_pin(&mut state, block)? {
                return Ok(buffer);
            }
            if self.unpinned.wait_until(&mut state, deadline).timed_out() {
                if let Some(buffer) = self.try_pin(&mut state, block)? {
                    return Ok(buffer);
                }
                warn!(%block, waited = ?self.max_wait, "no buffer available, aborting pin");
                return Err(CoreError::BufferAbort {
                    waited: self.max_wait,
                });
            }
        }
    }

    /// Releases one pin on `buffer`. At zero pins it becomes replaceable.
    pub fn unpin(&self, buffer: &BufferRef) {
        let mut state = self.state.lock();
        let mut guard = buffer.lock();
        if !guard.is_pinned() {
            return;
        }
        guard.unpin();
        if !guard.is_pinned() {
            state.available += 1;
            self.unpinned.notify_all();
        }
    }

    /// Flushes every buffer last modified by `txnum`.
    ///
    /// # Errors
    ///
    /// Returns an error if a log flush or page write fails.
    pub fn flush_all(&self, txnum: TransactionId) -> CoreResult<()> {
        let _state = self.state.lock();
        for buffer in &self.pool {
            let mut guard = buffer.lock();
            if guard.modifying_tx() == Some(txnum) {
                guard.flush()?;
            }
        }
        Ok(())
    }

    /// Flushes every dirty buffer, whichever transaction modified it.
    ///
    /// # Errors
    ///
    /// Returns an error if a log flush or page write fails.
    pub fn flush_all_modified(&self) -> CoreResult<()> {
        let _state = self.state.lock();
        for buffer in &self.pool {
            buffer.lock().flush()?;
        }
        Ok(())
    }

    fn try_pin(&self, state: &mut PoolState, block: &BlockId) -> CoreResult<Option<BufferRef>> {
        let index = match state.resident.get(block) {
            Some(&index) => index,
            None => {
                let Some(index) = self.choose_unpinned(state) else {
                    return Ok(None);
                };
                let mut guard = self.pool[index].lock();
                let old = guard.block().cloned();
                debug!(%block, slot = index, "loading block into buffer");
                let assigned = guard.assign_to_block(block.clone());
                // A failed flush leaves the old block resident; a failed read leaves the slot empty.
                if let Some(old) = old.filter(|_| assigned.is_ok() || guard.block().is_none()) {
                    state.resident.remove(&old);
                }
                assigned?;
                state.resident.insert(block.clone(), index);
                index
            }
        };

        let buffer = &self.pool[index];
        let mut guard = buffer.lock();
        if !guard.is_pinned() {
            state.available -= 1;
        }
        guard.pin();
        Ok(Some(Arc::clone(buffer)))
    }

    /// Round-robin scan for an unpinned buffer.
    fn choose_unpinned(&self, state: &mut PoolState) -> Option<usize> {
        let count = self.pool.len();
        let start = state.clock;
        let index = (0..count)
            .map(|step| (start + step) % count)
            .find(|&index| !self.pool[index].lock().is_pinned())?;
        state.clock = (index + 1) % count;
        Some(index)
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("capacity", &self.pool.len())
            .field("available", &self.available())
            .field("max_wait", &self.max_wait)
            .finish_non_exhaustive()
    }
}
