//! A single buffer slot.

use crate::error::CoreResult;
use crate::log::LogManager;
use crate::types::{Lsn, TransactionId};
use keel_storage::{BlockId, BlockStore, Page};
use std::sync::Arc;

/// One slot of the buffer pool: a page plus its residency and modification state.
pub struct Buffer {
    store: Arc<dyn BlockStore>,
    log: Arc<LogManager>,
    contents: Page,
    block: Option<BlockId>,
    pins: u32,
    modified_by: Option<TransactionId>,
    lsn: Option<Lsn>,
}

impl Buffer {
    pub(crate) fn new(store: Arc<dyn BlockStore>, log: Arc<LogManager>) -> Self {
        let contents = Page::new(store.block_size());
        Self {
            store,
            log,
            contents,
            block: None,
            pins: 0,
            modified_by: None,
            lsn: None,
        }
    }

    /// Returns the page held by this buffer.
    #[must_use]
    pub fn contents(&self) -> &Page {
        &self.contents
    }

    /// Returns the page mutably. Callers must also call [`Buffer::set_modified`].
    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    /// Returns the block held by this buffer, if any.
    #[must_use]
    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    /// Records that `txnum` changed the page.
    ///
    /// `lsn` is the LSN of the undo record for the change, or `None` when the
    /// change was not logged. An unlogged change keeps the LSN of any earlier
    /// logged change still held in the page.
    pub fn set_modified(&mut self, txnum: TransactionId, lsn: Option<Lsn>) {
        self.modified_by = Some(txnum);
        if lsn.is_some() {
            self.lsn = lsn;
        }
    }

    /// Returns the transaction whose change has not been flushed yet.
    #[must_use]
    pub fn modifying_tx(&self) -> Option<TransactionId> {
        self.modified_by
    }

    /// Returns the LSN the log must reach before this page may be written.
    #[must_use]
    pub fn lsn(&self) -> Option<Lsn> {
        self.lsn
    }

    /// Returns true while at least one pin is held.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    /// Returns the number of pins held across all transactions.
    #[must_use]
    pub fn pin_count(&self) -> u32 {
        self.pins
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
    }

    pub(crate) fn unpin(&mut self) {
        self.pins = self.pins.saturating_sub(1);
    }

    /// Writes the page if it is dirty, flushing the log up to its LSN first.
    pub(crate) fn flush(&mut self) -> CoreResult<()> {
        if self.modified_by.is_none() {
            return Ok(());
        }
        if let Some(lsn) = self.lsn {
            self.log.flush(lsn)?;
        }
        if let Some(block) = &self.block {
            self.store.write(block, &self.contents)?;
        }
        self.modified_by = None;
        self.lsn = None;
        Ok(())
    }

    /// Replaces the buffer's contents with `block`, flushing the old page first.
    pub(crate) fn assign_to_block(&mut self, block: BlockId) -> CoreResult<()> {
        self.flush()?;
        self.block = None;
        self.store.read(&block, &mut self.contents)?;
        self.block = Some(block);
        self.pins = 0;
        Ok(())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("block", &self.block)
            .field("pins", &self.pins)
            .field("modified_by", &self.modified_by)
            .field("lsn", &self.lsn)
            .finish_non_exhaustive()
    }
}
