//! Block identifiers.

use std::fmt;

/// Position of a block within its file.
pub type BlockNumber = u32;

/// Identifies one block: a file name plus a block number.
///
/// `BlockId` is an immutable value with structural equality. It is the key
/// used by the buffer pool, the lock table and every transaction's pin table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    filename: String,
    number: BlockNumber,
}

impl BlockId {
    /// Block number reserved for a file's end-of-file marker.
    ///
    /// No real block ever carries this number; transactions lock it to
    /// serialize `size`/`append` on a file.
    pub const END_OF_FILE: BlockNumber = BlockNumber::MAX;

    /// Creates a block identifier.
    #[must_use]
    pub fn new(filename: impl Into<String>, number: BlockNumber) -> Self {
        Self {
            filename: filename.into(),
            number,
        }
    }

    /// Returns the end-of-file marker block for `filename`.
    #[must_use]
    pub fn end_of_file(filename: impl Into<String>) -> Self {
        Self::new(filename, Self::END_OF_FILE)
    }

    /// Returns the file name.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the block number.
    #[must_use]
    pub const fn number(&self) -> BlockNumber {
        self.number
    }

    /// Returns true for an end-of-file marker.
    #[must_use]
    pub const fn is_end_of_file(&self) -> bool {
        self.number == Self::END_OF_FILE
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_of_file() {
            write!(f, "[file {}, eof]", self.filename)
        } else {
            write!(f, "[file {}, block {}]", self.filename, self.number)
        }
    }
}
