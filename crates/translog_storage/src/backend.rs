//! The byte-store contract shared by every backend.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The log engine frames records itself; a backend only has to remember bytes
/// in the order they were appended and return any range of them later.
///
/// # Invariants
///
/// - `append` returns the offset of the first byte it wrote
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `flush` the data has left process buffers; after `sync` it is on disk
/// - `truncate` only ever shrinks the store
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is read-only or the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    fn flush(&mut self) -> StorageResult<()>;

    /// Current size in bytes, which is also the offset of the next append.
    fn size(&self) -> StorageResult<u64>;

    /// Makes data and metadata durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the store back to `new_size` bytes.
    ///
    /// Used to drop a half-written trailing record left behind by a crash.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Whether `append` and `truncate` are permitted.
    fn is_writable(&self) -> bool {
        true
    }
}
