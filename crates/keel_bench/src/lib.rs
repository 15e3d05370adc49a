//! Shared helpers for the Keel benchmarks.

pub mod utils;
