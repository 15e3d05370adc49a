//! CLI command implementations.

pub mod dump_log;
pub mod inspect;
pub mod recover;

use keel_core::Config;

/// Configuration for opening an existing database from the command line.
pub fn existing_db_config(block_size: usize) -> Config {
    Config::new()
        .block_size(block_size)
        .create_if_missing(false)
        .recover_on_open(false)
}
