//! End-to-end scenarios over a whole engine.
//!
//! The helpers here seed and read back fixed string slots so tests can
//! compare a database against its expected contents. The tests at the bottom
//! exercise pin conservation, write-ahead ordering, undo, commit durability,
//! crash recovery and torn log blocks.

use crate::generators::SLOT_WIDTH;
use keel_core::{CoreResult, Database};
use keel_storage::BlockId;

/// File used by the slot helpers.
pub const SLOT_FILE: &str = "slots.tbl";

/// Value [`seed_slots`] writes into a slot.
pub fn initial_value(block: u32, slot: usize) -> String {
    format!("init-{block}-{slot}")
}

/// Writes [`initial_value`] into every slot of `blocks` blocks and commits.
///
/// # Errors
///
/// Returns any error from the seeding transaction.
pub fn seed_slots(db: &Database, blocks: u32, slots: usize) -> CoreResult<()> {
    let mut tx = db.begin()?;
    for number in 0..blocks {
        let block = BlockId::new(SLOT_FILE, number);
        tx.pin(&block)?;
        for slot in 0..slots {
            tx.set_string(&block, slot * SLOT_WIDTH, &initial_value(number, slot), false)?;
        }
        tx.unpin(&block)?;
    }
    tx.commit()
}

/// Reads every slot of `blocks` blocks in a fresh transaction.
///
/// # Errors
///
/// Returns any error from the reading transaction.
pub fn read_slots(db: &Database, blocks: u32, slots: usize) -> CoreResult<Vec<Vec<String>>> {
    let mut tx = db.begin()?;
    let mut values = Vec::with_capacity(blocks as usize);
    for number in 0..blocks {
        let block = BlockId::new(SLOT_FILE, number);
        tx.pin(&block)?;
        let row = (0..slots)
            .map(|slot| tx.get_string(&block, slot * SLOT_WIDTH))
            .collect::<CoreResult<Vec<_>>>()?;
        values.push(row);
        tx.unpin(&block)?;
    }
    tx.commit()?;
    Ok(values)
}

/// Expected result of [`read_slots`] right after [`seed_slots`].
pub fn seeded_values(blocks: u32, slots: usize) -> Vec<Vec<String>> {
    (0..blocks)
        .map(|block| (0..slots).map(|slot| initial_value(block, slot)).collect())
        .collect()
}
