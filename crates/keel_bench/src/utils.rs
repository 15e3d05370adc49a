//! Benchmark utilities.

use keel_core::{Config, Database};
use keel_storage::{BlockId, InMemoryBlockStore};
use rand::Rng;
use std::sync::Arc;

/// Block size used by the benchmarks.
pub const BENCH_BLOCK_SIZE: usize = 4096;

/// Generate random record data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random block ids over `blocks` blocks of `file`.
pub fn random_blocks(file: &str, blocks: u32, count: usize) -> Vec<BlockId> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| BlockId::new(file, rng.gen_range(0..blocks)))
        .collect()
}

/// Creates an in-memory database with `buffers` buffers.
pub fn memory_db(buffers: usize) -> Database {
    let store = Arc::new(InMemoryBlockStore::new(BENCH_BLOCK_SIZE));
    Database::with_store(store, Config::new().buffer_count(buffers))
        .expect("in-memory database opens")
}
