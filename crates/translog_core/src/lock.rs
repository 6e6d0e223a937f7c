//! Single-writer advisory lock for file-backed stores.

use crate::error::{LogError, LogResult};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Suffix appended to the store path to name its lock file.
const LOCK_SUFFIX: &str = ".lock";

/// Exclusive lock held by the one handle allowed to write a store.
///
/// The lock lives on a sidecar file next to the store, so the store file
/// itself can be opened freely by readers. It is released when the value is
/// dropped.
#[derive(Debug)]
pub(crate) struct WriterLock {
    path: PathBuf,
    _file: File,
}

impl WriterLock {
    /// Takes the lock for the store at `store_path` without blocking.
    ///
    /// # Errors
    ///
    /// [`LogError::Locked`] if another handle holds it, or an I/O error if the
    /// lock file cannot be created.
    pub(crate) fn acquire(store_path: &Path) -> LogResult<Self> {
        let path = lock_path(store_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LogError::Locked);
        }

        Ok(Self { path, _file: file })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the lock file, then releases the lock.
    pub(crate) fn remove(self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = OsString::from(store_path.as_os_str());
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lock_file_sits_next_to_store() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("run.tlog");
        let lock = WriterLock::acquire(&store).unwrap();
        assert_eq!(lock.path(), dir.path().join("run.tlog.lock"));
        assert!(lock.path().exists());
    }

    #[test]
    fn second_writer_is_locked_out() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("run.tlog");
        let _first = WriterLock::acquire(&store).unwrap();
        assert!(matches!(
            WriterLock::acquire(&store),
            Err(LogError::Locked)
        ));
    }

    #[test]
    fn released_on_drop() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("run.tlog");
        drop(WriterLock::acquire(&store).unwrap());
        WriterLock::acquire(&store).unwrap();
    }

    #[test]
    fn remove_deletes_lock_file() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("run.tlog");
        let lock = WriterLock::acquire(&store).unwrap();
        let path = lock.path().to_path_buf();
        lock.remove().unwrap();
        assert!(!path.exists());
        WriterLock::acquire(&store).unwrap();
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("missing").join("run.tlog");
        assert!(matches!(
            WriterLock::acquire(&store),
            Err(LogError::Io(_))
        ));
    }
}
