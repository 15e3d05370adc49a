//! # Keel Core
//!
//! Transactional core of the Keel storage engine.
//!
//! This crate provides:
//! - An undo-only write-ahead log with force-at-commit
//! - A bounded buffer pool with pinning and write-ahead flushing
//! - Block-level two-phase locking with timeout-based abort
//! - Rollback and crash recovery driven by the log
//! - The [`Transaction`] facade the record layer builds on
//!
//! ## Example
//!
//! ```rust
//! use keel_core::{Config, Database};
//! use keel_storage::InMemoryBlockStore;
//! use std::sync::Arc;
//!
//! let db = Database::with_store(Arc::new(InMemoryBlockStore::new(400)), Config::default())?;
//!
//! let mut tx = db.begin()?;
//! let block = tx.append("data.tbl")?;
//! tx.pin(&block)?;
//! tx.set_int(&block, 80, 42, true)?;
//! tx.rollback()?;
//!
//! let mut tx = db.begin()?;
//! tx.pin(&block)?;
//! assert_eq!(tx.get_int(&block, 80)?, 0);
//! tx.commit()?;
//! # Ok::<(), keel_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod lock;
pub mod log;
pub mod recovery;
pub mod transaction;

mod config;
mod database;
mod dir;
mod error;
mod types;

pub use buffer::{Buffer, BufferManager, BufferRef};
pub use config::Config;
pub use database::Database;
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use lock::{ConcurrencyManager, LockMode, LockState, LockTable};
pub use log::{LogIterator, LogManager};
pub use recovery::{LogRecord, RecordKind, RecoveryManager};
pub use transaction::{Transaction, TransactionState};
pub use types::{Lsn, TransactionId};

/// Crate version, as recorded in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
