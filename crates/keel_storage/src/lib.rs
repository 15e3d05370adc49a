//! # Keel Storage
//!
//! Block store trait and implementations for Keel.
//!
//! This crate provides the lowest-level storage abstraction for Keel.
//! A block store hands out **fixed-size blocks** of named files. It does not
//! interpret the bytes it stores; logging, buffering and recovery live in
//! `keel_core`.
//!
//! ## Design Principles
//!
//! - Every file is a sequence of `block_size`-byte blocks addressed by [`BlockId`]
//! - Reading a block that was never written yields zeros
//! - Stores serialize their own disk access and must be `Send + Sync`
//! - [`Page`] is the in-memory image of one block, with typed accessors
//!
//! ## Available Stores
//!
//! - [`InMemoryBlockStore`] - For testing and ephemeral engines
//! - [`FileBlockStore`] - One OS file per logical file inside a directory
//!
//! ## Example
//!
//! ```rust
//! use keel_storage::{BlockStore, InMemoryBlockStore, Page};
//!
//! let store = InMemoryBlockStore::new(64);
//! let block = store.append("data.tbl").unwrap();
//!
//! let mut page = Page::new(store.block_size());
//! page.set_int(0, 42).unwrap();
//! store.write(&block, &page).unwrap();
//!
//! let mut read_back = Page::new(store.block_size());
//! store.read(&block, &mut read_back).unwrap();
//! assert_eq!(read_back.get_int(0).unwrap(), 42);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod error;
mod file;
mod memory;
mod page;
mod store;

pub use block::{BlockId, BlockNumber};
pub use error::{StorageError, StorageResult};
pub use file::FileBlockStore;
pub use memory::InMemoryBlockStore;
pub use page::{Page, INT_SIZE};
pub use store::BlockStore;
