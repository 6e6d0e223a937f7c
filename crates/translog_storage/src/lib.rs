//! # translog storage
//!
//! Byte-store backends underneath the translog message log.
//!
//! A backend knows nothing about message records, headers or checksums. It
//! stores an append-only run of bytes and hands back ranges of it on request;
//! `translog_core` owns the on-disk layout.
//!
//! ## Backends
//!
//! - [`InMemoryBackend`] - process-local store behind the `":memory:"` destination
//! - [`FileBackend`] - persistent store on a single file
//!
//! ## Example
//!
//! ```rust
//! use translog_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"chirp").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"chirp");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
