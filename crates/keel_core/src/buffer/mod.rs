//! Bounded buffer pool.
//!
//! A fixed number of [`Buffer`]s is created when the pool is built; their
//! identity lasts for the pool's lifetime while their contents are recycled
//! between blocks.
//!
//! ## Write-Ahead Rule
//!
//! A buffer modified under a logged change carries the LSN of that change.
//! Flushing the buffer first flushes the log up to that LSN, then writes the
//! page, so a page never reaches disk ahead of its undo record.
//!
//! ## Pinning
//!
//! A pinned buffer is never replaced. When every buffer is pinned,
//! [`BufferManager::pin`] waits until one is unpinned or the wait threshold
//! passes, then fails with `BufferAbort`.

mod manager;
mod page_buffer;

pub use manager::{BufferManager, BufferRef};
pub use page_buffer::Buffer;
