//! # Keel Testkit
//!
//! Test utilities for Keel.
//!
//! This crate provides:
//! - Test fixtures, including simulated process restarts
//! - A crash-injecting block store for torn and failed writes
//! - Property-based test generators using proptest
//! - End-to-end scenarios over slot-structured test data
//! - Stress testing utilities for lock contention
//!
//! ## Usage
//!
//! ```rust
//! use keel_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     seed_slots(db, 2, 3).unwrap();
//!     assert_eq!(read_slots(db, 2, 3).unwrap(), seeded_values(2, 3));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod scenarios;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::scenarios::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use scenarios::*;
pub use stress::*;
