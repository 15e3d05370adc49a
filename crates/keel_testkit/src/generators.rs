//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that stays inside the engine's limits.

use keel_core::{LogRecord, TransactionId};
use keel_storage::BlockId;
use proptest::prelude::*;

/// Width of one string slot used by [`slot_write_strategy`].
pub const SLOT_WIDTH: usize = 50;

/// Longest string produced by [`short_string_strategy`].
pub const MAX_SHORT_STRING: usize = 20;

/// A pin or unpin request made by one of several transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOp {
    /// Transaction `tx` pins block `block`.
    Pin {
        /// Index of the transaction.
        tx: usize,
        /// Block number in the test file.
        block: u32,
    },
    /// Transaction `tx` releases one pin on block `block`, if it holds one.
    Unpin {
        /// Index of the transaction.
        tx: usize,
        /// Block number in the test file.
        block: u32,
    },
}

/// A logged string write into one slot of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    /// Block number in the test file.
    pub block: u32,
    /// Slot index; the byte offset is `slot * SLOT_WIDTH`.
    pub slot: usize,
    /// Value written.
    pub value: String,
}

impl SlotWrite {
    /// Returns the byte offset of the slot.
    pub fn offset(&self) -> usize {
        self.slot * SLOT_WIDTH
    }
}

/// Strategy for block ids in `file` with numbers below `blocks`.
pub fn block_strategy(file: &'static str, blocks: u32) -> impl Strategy<Value = BlockId> {
    (0..blocks).prop_map(move |number| BlockId::new(file, number))
}

/// Strategy for short lowercase strings that fit in one slot.
pub fn short_string_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex(&format!("[a-z0-9 ]{{0,{MAX_SHORT_STRING}}}")).expect("Invalid regex")
}

/// Strategy for pin/unpin sequences over `txs` transactions and `blocks` blocks.
pub fn pin_ops_strategy(txs: usize, blocks: u32, max_len: usize) -> impl Strategy<Value = Vec<PinOp>> {
    let op = (0..txs, 0..blocks, any::<bool>()).prop_map(|(tx, block, pin)| {
        if pin {
            PinOp::Pin { tx, block }
        } else {
            PinOp::Unpin { tx, block }
        }
    });
    prop::collection::vec(op, 1..max_len)
}

/// Strategy for string writes over `blocks` blocks with `slots` slots each.
pub fn slot_write_strategy(blocks: u32, slots: usize) -> impl Strategy<Value = SlotWrite> {
    (0..blocks, 0..slots, short_string_strategy())
        .prop_map(|(block, slot, value)| SlotWrite { block, slot, value })
}

/// Strategy for raw log records between 1 and `max` bytes.
pub fn record_bytes_strategy(max: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=max)
}

fn txnum_strategy() -> impl Strategy<Value = TransactionId> {
    (1u32..1000).prop_map(TransactionId::new)
}

/// Strategy for well-formed log records.
pub fn log_record_strategy() -> impl Strategy<Value = LogRecord> {
    prop_oneof![
        Just(LogRecord::Checkpoint),
        txnum_strategy().prop_map(|txnum| LogRecord::Start { txnum }),
        txnum_strategy().prop_map(|txnum| LogRecord::Commit { txnum }),
        txnum_strategy().prop_map(|txnum| LogRecord::Rollback { txnum }),
        (
            txnum_strategy(),
            block_strategy("data.tbl", 16),
            0usize..300,
            any::<i32>()
        )
            .prop_map(|(txnum, block, offset, old_value)| LogRecord::SetInt {
                txnum,
                block,
                offset,
                old_value,
            }),
        (
            txnum_strategy(),
            block_strategy("data.tbl", 16),
            0usize..300,
            short_string_strategy()
        )
            .prop_map(|(txnum, block, offset, old_value)| LogRecord::SetString {
                txnum,
                block,
                offset,
                old_value,
            }),
    ]
}
