//! Shared lock table.

use crate::error::{CoreError, CoreResult};
use crate::lock::LockMode;
use keel_storage::BlockId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

/// Lock state of one block. A block absent from the table is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Held shared by this many transactions.
    Shared(u32),
    /// Held exclusively by one transaction.
    Exclusive,
}

/// Per-block shared/exclusive lock state with bounded waiting.
///
/// The table does not know which transaction holds a lock; the
/// [`super::ConcurrencyManager`] of each transaction keeps that record.
/// Every waiter sleeps on one condition variable and re-checks its whole
/// request after any block becomes free, so spurious wakeups are harmless.
pub struct LockTable {
    locks: Mutex<HashMap<BlockId, LockState>>,
    released: Condvar,
    max_wait: Duration,
}

impl LockTable {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new(max_wait: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            max_wait,
        }
    }

    /// Grants a shared lock on `block`, waiting while another holder has it exclusive.
    ///
    /// # Errors
    ///
    /// Returns `LockAbort` if the lock is not granted within the wait threshold.
    pub fn slock(&self, block: &BlockId) -> CoreResult<()> {
        let mut locks = self.wait_until_clear(block, LockMode::Shared, |state| {
            matches!(state, Some(LockState::Exclusive))
        })?;
        match locks.get_mut(block) {
            Some(LockState::Shared(count)) => *count += 1,
            _ => {
                locks.insert(block.clone(), LockState::Shared(1));
            }
        }
        Ok(())
    }

    /// Grants an exclusive lock on `block`.
    ///
    /// The caller must already hold a shared lock on the block; the request
    /// succeeds once that is the only shared lock left.
    ///
    /// # Errors
    ///
    /// Returns `LockAbort` if the lock is not granted within the wait threshold.
    pub fn xlock(&self, block: &BlockId) -> CoreResult<()> {
        let mut locks = self.wait_until_clear(block, LockMode::Exclusive, |state| {
            matches!(state, Some(LockState::Exclusive))
                || matches!(state, Some(LockState::Shared(count)) if *count > 1)
        })?;
        locks.insert(block.clone(), LockState::Exclusive);
        Ok(())
    }

    /// Releases one lock on `block`, waking all waiters if the block becomes free.
    pub fn unlock(&self, block: &BlockId) {
        let mut locks = self.locks.lock();
        match locks.get_mut(block) {
            Some(LockState::Shared(count)) if *count > 1 => *count -= 1,
            Some(_) => {
                locks.remove(block);
                self.released.notify_all();
            }
            None => {}
        }
    }

    /// Returns the current lock state of `block` (`None` when free).
    #[must_use]
    pub fn holders(&self, block: &BlockId) -> Option<LockState> {
        self.locks.lock().get(block).copied()
    }

    /// Returns the number of blocks currently locked.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.locks.lock().len()
    }

    fn wait_until_clear(
        &self,
        block: &BlockId,
        mode: LockMode,
        conflicts: impl Fn(Option<&LockState>) -> bool,
    ) -> CoreResult<MutexGuard<'_, HashMap<BlockId, LockState>>> {
        let deadline = Instant::now() + self.max_wait;
        let mut locks = self.locks.lock();
        while conflicts(locks.get(block)) {
            if self.released.wait_until(&mut locks, deadline).timed_out()
                && conflicts(locks.get(block))
            {
                warn!(%block, ?mode, waited = ?self.max_wait, "lock request timed out");
                return Err(CoreError::LockAbort {
                    block: block.clone(),
                    mode,
                    waited: self.max_wait,
                });
            }
        }
        Ok(locks)
    }
}

impl std::fmt::Debug for LockTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockTable")
            .field("locked", &self.locked_count())
            .field("max_wait", &self.max_wait)
            .finish()
    }
}
