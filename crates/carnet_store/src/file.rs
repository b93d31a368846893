//! File-based snapshot backend.
//!
//! Store directory layout:
//!
//! ```text
//! <store_dir>/
//! ├─ LOCK          # advisory lock: one store instance per directory
//! ├─ key.bin       # 32-byte installation seed
//! └─ store.cbor    # encoded snapshot
//! ```
//!
//! The LOCK file ensures only one process owns the store at a time.
//! Snapshot writes go through a temp file + atomic rename, so a crash
//! leaves either the previous snapshot or the new one, never a torn file.

use crate::backend::SnapshotBackend;
use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File names within the store directory.
const LOCK_FILE: &str = "LOCK";
const KEY_FILE: &str = "key.bin";
const SNAPSHOT_FILE: &str = "store.cbor";
/// Temporary file for atomic snapshot writes.
const SNAPSHOT_TEMP: &str = "store.cbor.tmp";

/// A file-based snapshot backend holding the directory lock.
///
/// # Thread Safety
///
/// The backend holds an exclusive advisory lock on the store directory.
/// Only one `FileBackend` instance can exist per directory at a time,
/// across processes.
#[derive(Debug)]
pub struct FileBackend {
    /// Root directory path.
    dir: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a store directory and takes its exclusive lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - Another process holds the lock (returns `StoreError::Locked`)
    /// - I/O errors occur
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        // Non-blocking: a held lock is a usage error, not a wait.
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(dir.to_path_buf()));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory path.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the installation seed file.
    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Syncs the store directory so renames are durable.
    #[cfg(unix)]
    fn sync_directory(&self) -> StoreResult<()> {
        let dir = File::open(&self.dir)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> StoreResult<()> {
        // NTFS journaling covers metadata durability; directory fsync is
        // not available on Windows.
        Ok(())
    }
}

impl SnapshotBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(self.snapshot_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn persist(&mut self, bytes: &[u8]) -> StoreResult<()> {
        let temp_path = self.dir.join(SNAPSHOT_TEMP);

        // Write to temp file
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        // Atomic rename
        fs::rename(&temp_path, self.snapshot_path())?;

        // Fsync directory to ensure the rename is durable
        self.sync_directory()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("store");

        assert!(!dir.exists());
        let backend = FileBackend::open(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(dir.join("LOCK").exists());
        drop(backend);
    }

    #[test]
    fn fresh_directory_has_no_snapshot() {
        let temp = tempdir().unwrap();
        let backend = FileBackend::open(temp.path()).unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let temp = tempdir().unwrap();
        let mut backend = FileBackend::open(temp.path()).unwrap();

        backend.persist(b"snapshot one").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"snapshot one");

        backend.persist(b"snapshot two").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"snapshot two");
    }

    #[test]
    fn snapshot_survives_reopen() {
        let temp = tempdir().unwrap();

        {
            let mut backend = FileBackend::open(temp.path()).unwrap();
            backend.persist(b"persistent").unwrap();
        }

        let backend = FileBackend::open(temp.path()).unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"persistent");
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();

        let _backend = FileBackend::open(temp.path()).unwrap();

        let result = FileBackend::open(temp.path());
        assert!(matches!(result, Err(StoreError::Locked(_))));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();

        {
            let _backend = FileBackend::open(temp.path()).unwrap();
        }

        let _backend2 = FileBackend::open(temp.path()).unwrap();
    }

    #[test]
    fn no_temp_file_left_behind() {
        let temp = tempdir().unwrap();
        let mut backend = FileBackend::open(temp.path()).unwrap();

        backend.persist(b"data").unwrap();
        assert!(!temp.path().join("store.cbor.tmp").exists());
    }
}
