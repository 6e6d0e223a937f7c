//! Test fixtures and log helpers.

use crate::chirp::decode_chirp;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use translog_core::{Log, LogResult, OpenMode};

/// A log file path inside a temporary directory that is removed on drop.
pub struct TempLog {
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TempLog {
    /// Creates a fresh directory; the log file itself does not exist yet.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self {
            path: temp_dir.path().join("test.tlog"),
            _temp_dir: temp_dir,
        }
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the log for reading.
    ///
    /// # Errors
    ///
    /// Propagates the open error, e.g. while a recorder still holds it.
    pub fn open_read(&self) -> LogResult<Log> {
        let mut log = Log::new();
        log.open(&self.path, OpenMode::Read)?;
        Ok(log)
    }

    /// Opens the log for writing, creating it if needed.
    ///
    /// # Errors
    ///
    /// Propagates the open error.
    pub fn open_write(&self) -> LogResult<Log> {
        let mut log = Log::new();
        log.open(&self.path, OpenMode::ReadWrite)?;
        Ok(log)
    }

    /// Every recorded message as `(topic, chirp value)`, oldest first.
    ///
    /// Messages that are not chirps are skipped.
    ///
    /// # Errors
    ///
    /// Propagates open and read errors.
    pub fn chirps(&self) -> LogResult<Vec<(String, i32)>> {
        recorded_chirps(&self.open_read()?)
    }
}

impl Default for TempLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Every chirp in `log` as `(topic, value)`, oldest first.
///
/// # Errors
///
/// Propagates query and read errors.
pub fn recorded_chirps(log: &Log) -> LogResult<Vec<(String, i32)>> {
    let mut out = Vec::new();
    for message in log.all_messages()? {
        let message = message?;
        if let Some(value) = decode_chirp(message.data()) {
            out.push((message.topic().to_owned(), value));
        }
    }
    Ok(out)
}

/// Runs `f` with a fresh in-memory log open for writing.
///
/// # Panics
///
/// Panics if the in-memory log cannot be opened.
pub fn with_memory_log<F, R>(f: F) -> R
where
    F: FnOnce(&Log) -> R,
{
    let log = Log::open_in_memory().expect("Failed to open in-memory log");
    f(&log)
}
