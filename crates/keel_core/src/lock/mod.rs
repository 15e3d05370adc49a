//! Block-level two-phase locking.
//!
//! - [`LockTable`] is the one lock-state table shared by every transaction of
//!   a [`crate::Database`]. It is an explicitly constructed object handed to
//!   each [`ConcurrencyManager`], not a global.
//! - [`ConcurrencyManager`] belongs to one transaction. It remembers which
//!   locks the transaction already holds, so repeated reads and writes do
//!   not go back to the table, and upgrades shared locks to exclusive ones.
//!
//! Locks are released only when the transaction commits or rolls back.
//! Deadlocks are not detected: a request that cannot be granted within the
//! wait threshold fails with `LockAbort`.

mod concurrency;
mod table;

pub use concurrency::ConcurrencyManager;
pub use table::{LockState, LockTable};

/// Mode of a block lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared (read) lock; compatible with other shared locks.
    Shared,
    /// Exclusive (write) lock; compatible with nothing.
    Exclusive,
}
