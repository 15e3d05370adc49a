//! Fixed-size in-memory page with typed accessors.

use crate::error::{StorageError, StorageResult};

/// Width of an encoded integer (and of every length prefix).
pub const INT_SIZE: usize = 4;

/// In-memory image of one block.
///
/// A page is a byte array of exactly the store's block size. Integers are
/// stored as 32-bit little-endian values; byte strings and strings carry a
/// 4-byte length prefix followed by their bytes.
///
/// Every accessor is bounds-checked and reports [`StorageError::OutOfBounds`]
/// rather than panicking.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Vec<u8>,
}

impl Page {
    /// Creates a zero-filled page of `block_size` bytes.
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            data: vec![0; block_size],
        }
    }

    /// Wraps existing bytes as a page (used for log records).
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Number of bytes needed to store a length-prefixed value of `len` bytes.
    #[must_use]
    pub const fn max_length(len: usize) -> usize {
        INT_SIZE + len
    }

    /// Returns the page size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a zero-sized page.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the raw contents.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw contents mutably (stores fill pages through this).
    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero-fills the whole page.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Reads the 32-bit integer at `offset`.
    pub fn get_int(&self, offset: usize) -> StorageResult<i32> {
        let bytes = self.slice(offset, INT_SIZE)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Writes a 32-bit integer at `offset`.
    pub fn set_int(&mut self, offset: usize, value: i32) -> StorageResult<()> {
        self.slice_mut(offset, INT_SIZE)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Reads the length-prefixed byte string at `offset`.
    pub fn get_bytes(&self, offset: usize) -> StorageResult<Vec<u8>> {
        let len = self.get_length(offset)?;
        Ok(self.slice(offset + INT_SIZE, len)?.to_vec())
    }

    /// Writes `bytes` with a length prefix at `offset`.
    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> StorageResult<()> {
        let len = i32::try_from(bytes.len()).map_err(|_| StorageError::OutOfBounds {
            offset,
            len: bytes.len(),
            size: self.data.len(),
        })?;
        // Check the whole span first so a failed write leaves the page untouched.
        self.slice(offset, Self::max_length(bytes.len()))?;
        self.set_int(offset, len)?;
        self.slice_mut(offset + INT_SIZE, bytes.len())?
            .copy_from_slice(bytes);
        Ok(())
    }

    /// Reads the length-prefixed UTF-8 string at `offset`.
    pub fn get_string(&self, offset: usize) -> StorageResult<String> {
        let bytes = self.get_bytes(offset)?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidUtf8 { offset })
    }

    /// Writes a string with a length prefix at `offset`.
    pub fn set_string(&mut self, offset: usize, value: &str) -> StorageResult<()> {
        self.set_bytes(offset, value.as_bytes())
    }

    fn get_length(&self, offset: usize) -> StorageResult<usize> {
        let len = self.get_int(offset)?;
        usize::try_from(len).map_err(|_| StorageError::OutOfBounds {
            offset,
            len: INT_SIZE,
            size: self.data.len(),
        })
    }

    fn slice(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        let end = self.checked_end(offset, len)?;
        Ok(&self.data[offset..end])
    }

    fn slice_mut(&mut self, offset: usize, len: usize) -> StorageResult<&mut [u8]> {
        let end = self.checked_end(offset, len)?;
        Ok(&mut self.data[offset..end])
    }

    fn checked_end(&self, offset: usize, len: usize) -> StorageResult<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(end),
            _ => Err(StorageError::OutOfBounds {
                offset,
                len,
                size: self.data.len(),
            }),
        }
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
