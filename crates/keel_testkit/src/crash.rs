//! Crash simulation for Keel.
//!
//! [`CrashableStore`] wraps any block store and injects a fault into a
//! chosen write: the write either fails outright or is torn. Once a fault
//! fires the store behaves like a dead process and rejects every later write
//! until [`CrashableStore::reset`] is called.
//!
//! A torn write persists only the final bytes of the page. The block's
//! header (its first bytes) keeps its old contents, as when a multi-sector
//! write is cut off before reaching the first sector.
//!
//! The store also keeps a journal of successful writes so tests can check
//! write ordering.

use keel_storage::{BlockId, BlockNumber, BlockStore, Page, StorageError, StorageResult};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What happens to the write a fault fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Nothing is written.
    Fail,
    /// Only the last `keep` bytes of the page reach the store.
    Tear {
        /// Number of trailing bytes persisted.
        keep: usize,
    },
}

#[derive(Debug, Clone)]
struct Plan {
    target: Option<BlockId>,
    remaining: usize,
    fault: Fault,
}

/// A block store wrapper that can simulate crashes.
pub struct CrashableStore {
    inner: Arc<dyn BlockStore>,
    plan: Mutex<Option<Plan>>,
    journal: Mutex<Vec<BlockId>>,
    crashed: AtomicBool,
}

impl CrashableStore {
    /// Creates a new crashable store wrapping an inner store.
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            plan: Mutex::new(None),
            journal: Mutex::new(Vec::new()),
            crashed: AtomicBool::new(false),
        }
    }

    /// Lets `writes` more writes succeed, then fails the next one.
    pub fn fail_after(&self, writes: usize) {
        self.arm(None, writes, Fault::Fail);
    }

    /// Lets `writes` more writes succeed, then tears the next one.
    pub fn tear_after(&self, writes: usize, keep: usize) {
        self.arm(None, writes, Fault::Tear { keep });
    }

    /// Tears the next write to `block`, keeping its last `keep` bytes.
    pub fn tear_next_write_to(&self, block: BlockId, keep: usize) {
        self.arm(Some(block), 0, Fault::Tear { keep });
    }

    /// Clears any pending fault and the crashed state ("reboots" the store).
    pub fn reset(&self) {
        *self.plan.lock() = None;
        self.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether a fault has fired.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns every block successfully written so far, in order.
    pub fn writes(&self) -> Vec<BlockId> {
        self.journal.lock().clone()
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &Arc<dyn BlockStore> {
        &self.inner
    }

    fn arm(&self, target: Option<BlockId>, remaining: usize, fault: Fault) {
        *self.plan.lock() = Some(Plan {
            target,
            remaining,
            fault,
        });
    }

    /// Returns the fault to apply to a write of `block`, if one fires now.
    fn take_fault(&self, block: &BlockId) -> Option<Fault> {
        let mut plan = self.plan.lock();
        let current = plan.as_mut()?;
        if current.target.as_ref().is_some_and(|target| target != block) {
            return None;
        }
        if current.remaining > 0 {
            current.remaining -= 1;
            return None;
        }
        let fault = current.fault;
        *plan = None;
        Some(fault)
    }

    fn crashed_error(message: &str) -> StorageError {
        StorageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
    }
}

impl BlockStore for CrashableStore {
    fn read(&self, block: &BlockId, page: &mut Page) -> StorageResult<()> {
        self.inner.read(block, page)
    }

    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(Self::crashed_error("store has crashed"));
        }

        match self.take_fault(block) {
            None => {
                self.inner.write(block, page)?;
                self.journal.lock().push(block.clone());
                Ok(())
            }
            Some(Fault::Fail) => {
                self.crashed.store(true, Ordering::SeqCst);
                Err(Self::crashed_error("simulated crash before write"))
            }
            Some(Fault::Tear { keep }) => {
                self.crashed.store(true, Ordering::SeqCst);
                let mut torn = Page::new(self.inner.block_size());
                self.inner.read(block, &mut torn)?;
                let start = page.len().saturating_sub(keep);
                torn.contents_mut()[start..].copy_from_slice(&page.contents()[start..]);
                self.inner.write(block, &torn)?;
                Err(Self::crashed_error("simulated crash during write"))
            }
        }
    }

    fn append(&self, filename: &str) -> StorageResult<BlockId> {
        if self.has_crashed() {
            return Err(Self::crashed_error("store has crashed"));
        }
        self.inner.append(filename)
    }

    fn size(&self, filename: &str) -> StorageResult<BlockNumber> {
        self.inner.size(filename)
    }

    fn block_size(&self) -> usize {
        self.inner.block_size()
    }
}

impl std::fmt::Debug for CrashableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashableStore")
            .field("plan", &*self.plan.lock())
            .field("crashed", &self.has_crashed())
            .finish_non_exhaustive()
    }
}
