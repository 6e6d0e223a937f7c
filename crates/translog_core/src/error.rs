//! Error types for the message log.

use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while opening, writing or reading a log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] translog_storage::StorageError),

    /// I/O error outside the backend (lock files, schema descriptors).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The handle has no open store.
    #[error("log is closed")]
    Closed,

    /// `open` was called on a handle that already has a store.
    #[error("log is already open")]
    AlreadyOpen,

    /// An insert was attempted on a log opened for reading.
    #[error("log was opened read-only")]
    ReadOnly,

    /// Another handle holds the write lock on this store.
    #[error("log locked: another writer has exclusive access")]
    Locked,

    /// The store was written with a different schema.
    #[error("schema version mismatch: store is {found}, expected {expected}")]
    VersionMismatch {
        /// Version recorded in the store.
        found: String,
        /// Version this build reads and writes.
        expected: String,
    },

    /// The bytes on disk are not a log of any version.
    #[error("invalid log format: {message}")]
    InvalidFormat {
        /// What was wrong.
        message: String,
    },

    /// A record failed structural validation.
    #[error("log corruption at offset {offset}: {message}")]
    Corruption {
        /// Offset of the damaged record.
        offset: u64,
        /// What was wrong.
        message: String,
    },

    /// A record's checksum did not match its contents.
    #[error("checksum mismatch at offset {offset}: stored {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the damaged record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// An argument was rejected before touching storage.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The schema descriptor could not be loaded.
    #[error("schema descriptor error: {message}")]
    Schema {
        /// What was wrong.
        message: String,
    },
}

impl LogError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a corruption error for the record at `offset`.
    pub fn corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::Corruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a schema descriptor error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }
}
