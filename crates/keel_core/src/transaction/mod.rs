//! Transactions with two-phase locking and undo logging.
//!
//! A [`Transaction`] is the only interface the record layer above uses:
//! - Reads take a shared lock, writes an exclusive lock; both are held
//!   until commit or rollback
//! - Logged writes append an undo record before the page changes
//! - Commit forces the transaction's pages, then its `COMMIT` record
//! - Rollback undoes the transaction's records newest-first

mod pins;
mod state;

pub use state::{Transaction, TransactionState};
