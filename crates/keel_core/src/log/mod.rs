//! Append-only log for undo records.
//!
//! The log is the foundation of Keel's atomicity and crash recovery. Every
//! logged change appends an undo record (the value *before* the change)
//! before the page it describes may reach disk.
//!
//! ## Block Layout
//!
//! The log is a file of fixed-size blocks. Records fill each block from its
//! end toward its front; the first 4 bytes of every block hold the
//! *boundary*, the offset of the front-most record (the one written last):
//!
//! ```text
//! | boundary (4) | free space ... | len (4) | record | len (4) | record |
//!                                 ^ boundary
//! ```
//!
//! A record that does not fit in front of the boundary flushes the tail
//! block and starts a new one whose boundary is the block size.
//!
//! ## Streaming
//!
//! [`LogManager::iter`] flushes the tail and yields raw records newest-first:
//! blocks from the current one back to block 0, and within a block from the
//! boundary toward the end.
//!
//! ## Recovery Policy
//!
//! ### Tolerated Conditions (end of that block's walk)
//!
//! - **Boundary out of range**: not in `[4, block_size]` → block skipped
//! - **Bad length prefix**: zero, negative, or overrunning the block → rest of block skipped
//!
//! These are what a crash mid-write of the tail block leaves behind. A
//! `warn!` is emitted and streaming continues with the previous block.
//!
//! ### Fatal Conditions
//!
//! - **Unknown record tag** or **truncated record body** when decoding →
//!   `Err(LogCorruption)`
//!
//! ## Invariants
//!
//! - LSNs start at 1 and increase by one per append
//! - `flush(lsn)` makes every record up to `lsn` durable
//! - Records never span blocks; oversized records are rejected

mod iterator;
mod manager;

pub use iterator::LogIterator;
pub use manager::LogManager;
