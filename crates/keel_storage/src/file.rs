//! File-based block store for persistent storage.

use crate::block::{BlockId, BlockNumber};
use crate::error::{StorageError, StorageResult};
use crate::page::Page;
use crate::store::BlockStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of scratch files that never survive a restart.
const TEMP_PREFIX: &str = "temp";

/// A directory-backed block store.
///
/// Each logical file is an OS file inside the store's directory, and block
/// `n` lives at byte offset `n * block_size`. Data survives process restarts.
///
/// # Durability
///
/// With `sync_writes` enabled (the default), every `write` and `append`
/// calls `File::sync_data()` before returning, so a block the store has
/// acknowledged is on disk.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads. A single
/// internal lock serializes all disk access.
///
/// # Example
///
/// ```no_run
/// use keel_storage::{BlockStore, FileBlockStore, Page};
/// use std::path::Path;
///
/// let store = FileBlockStore::open(Path::new("db"), 4096).unwrap();
/// let block = store.append("data.tbl").unwrap();
/// store.write(&block, &Page::new(4096)).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlockStore {
    dir: PathBuf,
    block_size: usize,
    sync_writes: bool,
    is_new: bool,
    open_files: Mutex<HashMap<String, File>>,
}

impl FileBlockStore {
    /// Opens or creates a store in `dir`.
    ///
    /// The directory is created if needed. Leftover scratch files whose
    /// names start with `temp` are deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if `block_size` is zero or the directory cannot be
    /// created or listed.
    pub fn open(dir: &Path, block_size: usize) -> StorageResult<Self> {
        if block_size == 0 {
            return Err(StorageError::InvalidBlockSize(block_size));
        }
        let is_new = !dir.exists();
        if is_new {
            fs::create_dir_all(dir)?;
        }

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                debug!(path = %entry.path().display(), "removing leftover temp file");
                fs::remove_file(entry.path())?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            block_size,
            sync_writes: true,
            is_new,
            open_files: Mutex::new(HashMap::new()),
        })
    }

    /// Sets whether each block write is synced to disk.
    #[must_use]
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Returns true if the directory did not exist before [`Self::open`].
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Returns the store's directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists the regular files in the store's directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn files(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn check_page(&self, page: &Page) -> StorageResult<()> {
        if page.len() != self.block_size {
            return Err(StorageError::BlockSizeMismatch {
                expected: self.block_size,
                actual: page.len(),
            });
        }
        Ok(())
    }

    fn offset_of(&self, block: &BlockId) -> u64 {
        u64::from(block.number()) * self.block_size as u64
    }

    fn with_file<T>(
        &self,
        filename: &str,
        f: impl FnOnce(&mut File) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut open_files = self.open_files.lock();
        if !open_files.contains_key(filename) {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(self.dir.join(filename))?;
            open_files.insert(filename.to_string(), file);
        }
        match open_files.get_mut(filename) {
            Some(file) => f(file),
            None => Err(StorageError::Corrupted(format!(
                "file {filename} vanished from the open-file table"
            ))),
        }
    }

    fn block_count(&self, file: &File) -> StorageResult<BlockNumber> {
        let blocks = file.metadata()?.len() / self.block_size as u64;
        BlockNumber::try_from(blocks)
            .map_err(|_| StorageError::Corrupted(format!("file holds {blocks} blocks")))
    }
}

impl BlockStore for FileBlockStore {
    fn read(&self, block: &BlockId, page: &mut Page) -> StorageResult<()> {
        self.check_page(page)?;
        let offset = self.offset_of(block);
        self.with_file(block.filename(), |file| {
            let file_len = file.metadata()?.len();
            page.clear();
            if offset >= file_len {
                return Ok(());
            }
            let available = usize::try_from(file_len - offset)
                .unwrap_or(usize::MAX)
                .min(page.len());
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut page.contents_mut()[..available])?;
            Ok(())
        })
    }

    fn write(&self, block: &BlockId, page: &Page) -> StorageResult<()> {
        self.check_page(page)?;
        let offset = self.offset_of(block);
        self.with_file(block.filename(), |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(page.contents())?;
            if self.sync_writes {
                file.sync_data()?;
            }
            Ok(())
        })
    }

    fn append(&self, filename: &str) -> StorageResult<BlockId> {
        self.with_file(filename, |file| {
            let number = self.block_count(file)?;
            let block = BlockId::new(filename, number);
            file.seek(SeekFrom::Start(self.offset_of(&block)))?;
            file.write_all(&vec![0; self.block_size])?;
            if self.sync_writes {
                file.sync_data()?;
            }
            Ok(block)
        })
    }

    fn size(&self, filename: &str) -> StorageResult<BlockNumber> {
        self.with_file(filename, |file| self.block_count(file))
    }

    fn block_size(&self) -> usize {
        self.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        let store = FileBlockStore::open(&path, 64).unwrap();
        assert!(store.is_new());
        assert!(path.is_dir());
        assert_eq!(store.size("t.tbl").unwrap(), 0);
    }

    #[test]
    fn zero_block_size_rejected() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("keel.log"), [0u8; 64]).unwrap();

        let result = FileBlockStore::open(dir.path(), 0);
        assert!(matches!(result, Err(StorageError::InvalidBlockSize(0))));
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let store = FileBlockStore::open(dir.path(), 64).unwrap();
        assert!(!store.is_new());

        let b0 = store.append("t.tbl").unwrap();
        let b1 = store.append("t.tbl").unwrap();
        assert_eq!(b0.number(), 0);
        assert_eq!(b1.number(), 1);
        assert_eq!(store.size("t.tbl").unwrap(), 2);

        let mut page = Page::new(64);
        page.set_string(10, "block one").unwrap();
        store.write(&b1, &page).unwrap();

        let mut out = Page::new(64);
        store.read(&b1, &mut out).unwrap();
        assert_eq!(out.get_string(10).unwrap(), "block one");
    }

    #[test]
    fn file_read_past_end_zero_fills() {
        let dir = tempdir().unwrap();
        let store = FileBlockStore::open(dir.path(), 64).unwrap();

        let mut page = Page::new(64);
        page.set_int(0, 77).unwrap();
        store.read(&BlockId::new("t.tbl", 9), &mut page).unwrap();
        assert_eq!(page.get_int(0).unwrap(), 0);
    }

    #[test]
    fn file_short_trailing_block_is_zero_padded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("t.tbl"), [1u8, 0, 0, 0, 2]).unwrap();
        let store = FileBlockStore::open(dir.path(), 64).unwrap();

        let mut page = Page::new(64);
        store.read(&BlockId::new("t.tbl", 0), &mut page).unwrap();
        assert_eq!(page.get_int(0).unwrap(), 1);
        assert_eq!(page.contents()[4], 2);
        assert!(page.contents()[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let block = BlockId::new("t.tbl", 2);

        {
            let store = FileBlockStore::open(dir.path(), 64).unwrap();
            let mut page = Page::new(64);
            page.set_int(8, 1234).unwrap();
            store.write(&block, &page).unwrap();
        }

        {
            let store = FileBlockStore::open(dir.path(), 64).unwrap();
            assert_eq!(store.size("t.tbl").unwrap(), 3);
            let mut page = Page::new(64);
            store.read(&block, &mut page).unwrap();
            assert_eq!(page.get_int(8).unwrap(), 1234);
        }
    }

    #[test]
    fn file_temp_files_removed_on_open() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("temp1.tbl"), b"scratch").unwrap();
        std::fs::write(dir.path().join("keep.tbl"), b"data").unwrap();

        let store = FileBlockStore::open(dir.path(), 64).unwrap();
        assert_eq!(store.files().unwrap(), vec!["keep.tbl".to_string()]);
    }

    #[test]
    fn file_wrong_page_size_fails() {
        let dir = tempdir().unwrap();
        let store = FileBlockStore::open(dir.path(), 64)
            .unwrap()
            .with_sync_writes(false);
        let result = store.write(&BlockId::new("t.tbl", 0), &Page::new(32));
        assert!(matches!(result, Err(StorageError::BlockSizeMismatch { .. })));
    }
}
