//! Log record kinds and their wire format.

use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use crate::types::TransactionId;
use keel_storage::{BlockId, INT_SIZE};
use std::fmt;

/// Operation tag that starts every encoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RecordKind {
    /// Quiescent checkpoint.
    Checkpoint = 0,
    /// Transaction start.
    Start = 1,
    /// Transaction commit.
    Commit = 2,
    /// Transaction rollback.
    Rollback = 3,
    /// Integer overwrite.
    SetInt = 4,
    /// String overwrite.
    SetString = 5,
}

impl RecordKind {
    /// Converts a wire tag to a record kind.
    #[must_use]
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::Checkpoint),
            1 => Some(Self::Start),
            2 => Some(Self::Commit),
            3 => Some(Self::Rollback),
            4 => Some(Self::SetInt),
            5 => Some(Self::SetString),
            _ => None,
        }
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn as_tag(self) -> i32 {
        self as i32
    }

    /// Returns the upper-case name used when printing records.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Checkpoint => "CHECKPOINT",
            Self::Start => "START",
            Self::Commit => "COMMIT",
            Self::Rollback => "ROLLBACK",
            Self::SetInt => "SETINT",
            Self::SetString => "SETSTRING",
        }
    }
}

/// A decoded log record.
///
/// `SetInt` and `SetString` carry the value a page held *before* the logged
/// overwrite. Undoing them writes that value back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// Every transaction active before this point has been flushed.
    Checkpoint,

    /// A transaction started.
    Start {
        /// Owning transaction.
        txnum: TransactionId,
    },

    /// A transaction committed; its pages were flushed first.
    Commit {
        /// Owning transaction.
        txnum: TransactionId,
    },

    /// A transaction rolled back; its changes were undone first.
    Rollback {
        /// Owning transaction.
        txnum: TransactionId,
    },

    /// An integer at `offset` in `block` was overwritten.
    SetInt {
        /// Owning transaction.
        txnum: TransactionId,
        /// Modified block.
        block: BlockId,
        /// Byte offset inside the block.
        offset: usize,
        /// Value before the overwrite.
        old_value: i32,
    },

    /// A string at `offset` in `block` was overwritten.
    SetString {
        /// Owning transaction.
        txnum: TransactionId,
        /// Modified block.
        block: BlockId,
        /// Byte offset inside the block.
        offset: usize,
        /// Value before the overwrite.
        old_value: String,
    },
}

impl LogRecord {
    /// Returns the record kind.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Checkpoint => RecordKind::Checkpoint,
            Self::Start { .. } => RecordKind::Start,
            Self::Commit { .. } => RecordKind::Commit,
            Self::Rollback { .. } => RecordKind::Rollback,
            Self::SetInt { .. } => RecordKind::SetInt,
            Self::SetString { .. } => RecordKind::SetString,
        }
    }

    /// Returns the owning transaction, `None` for a checkpoint.
    #[must_use]
    pub fn txnum(&self) -> Option<TransactionId> {
        match self {
            Self::Checkpoint => None,
            Self::Start { txnum }
            | Self::Commit { txnum }
            | Self::Rollback { txnum }
            | Self::SetInt { txnum, .. }
            | Self::SetString { txnum, .. } => Some(*txnum),
        }
    }

    /// Serializes the record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if an offset or string length does not fit
    /// in a 32-bit field.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 * INT_SIZE);
        put_int(&mut buf, self.kind().as_tag());

        match self {
            Self::Checkpoint => {}
            Self::Start { txnum } | Self::Commit { txnum } | Self::Rollback { txnum } => {
                put_txnum(&mut buf, *txnum);
            }
            Self::SetInt {
                txnum,
                block,
                offset,
                old_value,
            } => {
                put_location(&mut buf, *txnum, block, *offset)?;
                put_int(&mut buf, *old_value);
            }
            Self::SetString {
                txnum,
                block,
                offset,
                old_value,
            } => {
                put_location(&mut buf, *txnum, block, *offset)?;
                put_bytes(&mut buf, old_value.as_bytes())?;
            }
        }

        Ok(buf)
    }

    /// Deserializes a record produced by [`LogRecord::encode`].
    ///
    /// # Errors
    ///
    /// Returns `LogCorruption` for an unknown tag, a truncated body, or
    /// trailing bytes.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let mut reader = Reader::new(bytes);
        let tag = reader.int()?;
        let kind = RecordKind::from_tag(tag)
            .ok_or_else(|| CoreError::log_corruption(format!("unknown record tag {tag}")))?;

        let record = match kind {
            RecordKind::Checkpoint => Self::Checkpoint,
            RecordKind::Start => Self::Start {
                txnum: reader.txnum()?,
            },
            RecordKind::Commit => Self::Commit {
                txnum: reader.txnum()?,
            },
            RecordKind::Rollback => Self::Rollback {
                txnum: reader.txnum()?,
            },
            RecordKind::SetInt => {
                let (txnum, block, offset) = reader.location()?;
                Self::SetInt {
                    txnum,
                    block,
                    offset,
                    old_value: reader.int()?,
                }
            }
            RecordKind::SetString => {
                let (txnum, block, offset) = reader.location()?;
                Self::SetString {
                    txnum,
                    block,
                    offset,
                    old_value: reader.string()?,
                }
            }
        };

        reader.finish(kind)?;
        Ok(record)
    }

    /// Reverses the logged change inside `tx`.
    ///
    /// Only `SetInt` and `SetString` do anything: they pin the block, write
    /// the old value back without logging, and unpin.
    ///
    /// # Errors
    ///
    /// Returns any pin, lock or page error raised by `tx`.
    pub fn undo(&self, tx: &mut Transaction) -> CoreResult<()> {
        match self {
            Self::Checkpoint | Self::Start { .. } | Self::Commit { .. } | Self::Rollback { .. } => {
                Ok(())
            }
            Self::SetInt {
                block,
                offset,
                old_value,
                ..
            } => {
                tx.pin(block)?;
                tx.set_int(block, *offset, *old_value, false)?;
                tx.unpin(block)
            }
            Self::SetString {
                block,
                offset,
                old_value,
                ..
            } => {
                tx.pin(block)?;
                tx.set_string(block, *offset, old_value, false)?;
                tx.unpin(block)
            }
        }
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind().name();
        match self {
            Self::Checkpoint => write!(f, "<{name}>"),
            Self::Start { txnum } | Self::Commit { txnum } | Self::Rollback { txnum } => {
                write!(f, "<{name} {}>", txnum.as_u32())
            }
            Self::SetInt {
                txnum,
                block,
                offset,
                old_value,
            } => write!(f, "<{name} {} {block} {offset} {old_value}>", txnum.as_u32()),
            Self::SetString {
                txnum,
                block,
                offset,
                old_value,
            } => write!(f, "<{name} {} {block} {offset} {old_value:?}>", txnum.as_u32()),
        }
    }
}

fn put_int(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_txnum(buf: &mut Vec<u8>, txnum: TransactionId) {
    buf.extend_from_slice(&txnum.as_u32().to_le_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = i32::try_from(bytes.len())
        .map_err(|_| CoreError::invalid_format(format!("{} bytes exceed a 32-bit length", bytes.len())))?;
    put_int(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn put_location(
    buf: &mut Vec<u8>,
    txnum: TransactionId,
    block: &BlockId,
    offset: usize,
) -> CoreResult<()> {
    let offset = i32::try_from(offset)
        .map_err(|_| CoreError::invalid_format(format!("offset {offset} exceeds a 32-bit field")))?;
    put_txnum(buf, txnum);
    put_bytes(buf, block.filename().as_bytes())?;
    buf.extend_from_slice(&block.number().to_le_bytes());
    put_int(buf, offset);
    Ok(())
}

/// Cursor over an encoded record.
struct Reader<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| CoreError::log_corruption("unexpected end of record"))?;
        let slice = &self.bytes[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn word(&mut self) -> CoreResult<[u8; INT_SIZE]> {
        self.take(INT_SIZE)?
            .try_into()
            .map_err(|_| CoreError::log_corruption("invalid 32-bit field"))
    }

    fn int(&mut self) -> CoreResult<i32> {
        Ok(i32::from_le_bytes(self.word()?))
    }

    fn txnum(&mut self) -> CoreResult<TransactionId> {
        Ok(TransactionId::new(u32::from_le_bytes(self.word()?)))
    }

    fn bytes(&mut self) -> CoreResult<&'a [u8]> {
        let len = self.int()?;
        let len = usize::try_from(len)
            .map_err(|_| CoreError::log_corruption(format!("negative length {len}")))?;
        self.take(len)
    }

    fn string(&mut self) -> CoreResult<String> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::log_corruption("string is not valid UTF-8"))
    }

    fn location(&mut self) -> CoreResult<(TransactionId, BlockId, usize)> {
        let txnum = self.txnum()?;
        let filename = self.string()?;
        let number = u32::from_le_bytes(self.word()?);
        let offset = self.int()?;
        let offset = usize::try_from(offset)
            .map_err(|_| CoreError::log_corruption(format!("negative offset {offset}")))?;
        Ok((txnum, BlockId::new(filename, number), offset))
    }

    fn finish(&self, kind: RecordKind) -> CoreResult<()> {
        if self.cursor != self.bytes.len() {
            return Err(CoreError::log_corruption(format!(
                "trailing bytes in {} record: expected {} bytes, got {}",
                kind.name(),
                self.cursor,
                self.bytes.len()
            )));
        }
        Ok(())
    }
}
