//! The message log: an embedded, schema-versioned store of time-stamped
//! binary messages.
//!
//! # Layout
//!
//! A store is a single byte stream: one header carrying the schema version,
//! followed by one framed record per message. On open the records are
//! scanned once to rebuild the in-memory `MessageIndex`;
//! afterwards every query is answered from the index and reads only the
//! records it returns.
//!
//! # Concurrency
//!
//! The backend sits behind a mutex that serializes appends and record reads.
//! The index sits behind a read-write lock. An insert takes the backend lock
//! first and the index lock second; queries never hold both at once, so
//! readers and the writer interleave at record granularity.

use crate::config::{Destination, LogConfig, OpenMode, SchemaDescriptor};
use crate::error::{LogError, LogResult};
use crate::index::{with_leading_slash, IndexEntry, MessageIndex, TopicFilter};
use crate::iter::{Message, MsgIter};
use crate::lock::WriterLock;
use crate::message_info::MessageInfo;
use crate::record::{decode_frame, encode_header, encode_record};
use crate::scan::{read_header, RecordScanner};
use crate::types::{TimeRange, Timestamp, TopicPattern};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use translog_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Schema version written into new stores and required of existing ones.
pub const SCHEMA_VERSION: &str = "0.1.0";

/// State shared between a [`Log`] and the iterators it hands out.
pub(crate) struct LogShared {
    backend: Mutex<Box<dyn StorageBackend>>,
    index: RwLock<MessageIndex>,
}

impl LogShared {
    pub(crate) fn index(&self) -> RwLockReadGuard<'_, MessageIndex> {
        self.index.read()
    }

    pub(crate) fn read_message(&self, entry: &IndexEntry) -> LogResult<Message> {
        let frame = self.backend.lock().read_at(entry.offset, entry.len as usize)?;
        decode_frame(entry.offset, &frame).map(Message::from)
    }
}

struct OpenLog {
    shared: Arc<LogShared>,
    destination: Destination,
    version: String,
    mode: OpenMode,
    sync_on_insert: bool,
    _lock: Option<WriterLock>,
}

impl OpenLog {
    fn open(destination: Destination, mode: OpenMode, config: &LogConfig) -> LogResult<Self> {
        let (mut backend, lock, created): (Box<dyn StorageBackend>, _, _) = match &destination {
            Destination::Memory => (Box::new(InMemoryBackend::new()), None, false),
            Destination::File(path) if !mode.is_writable() => {
                (Box::new(FileBackend::open_read_only(path)?), None, false)
            }
            Destination::File(path) => {
                let existed = path.exists();
                let backend = if config.create_dirs {
                    FileBackend::open_with_create_dirs(path)?
                } else {
                    FileBackend::open(path)?
                };
                let lock = WriterLock::acquire(path)?;
                (Box::new(backend), Some(lock), !existed)
            }
        };

        match Self::load(&mut *backend, &destination, mode, config) {
            Ok((version, index)) => Ok(Self {
                shared: Arc::new(LogShared {
                    backend: Mutex::new(backend),
                    index: RwLock::new(index),
                }),
                destination,
                version,
                mode,
                sync_on_insert: config.sync_on_insert,
                _lock: lock,
            }),
            Err(e) => {
                if let (true, Destination::File(path)) = (created, &destination) {
                    drop(backend);
                    remove_created(path, lock);
                }
                Err(e)
            }
        }
    }

    /// Writes the header of an empty store or validates and indexes an
    /// existing one.
    fn load(
        backend: &mut dyn StorageBackend,
        destination: &Destination,
        mode: OpenMode,
        config: &LogConfig,
    ) -> LogResult<(String, MessageIndex)> {
        let mut index = MessageIndex::new();

        let Some((version, first_record)) = read_header(backend)? else {
            if !backend.is_writable() {
                return Err(LogError::invalid_format(format!(
                    "{destination:?} is empty, not a log"
                )));
            }
            if let Some(schema_path) = &config.schema_path {
                let descriptor = SchemaDescriptor::load(schema_path)?;
                if descriptor.version != SCHEMA_VERSION {
                    return Err(LogError::VersionMismatch {
                        found: descriptor.version,
                        expected: SCHEMA_VERSION.to_owned(),
                    });
                }
            }
            backend.append(&encode_header(SCHEMA_VERSION)?)?;
            backend.flush()?;
            backend.sync()?;
            debug!(?destination, version = SCHEMA_VERSION, "created log store");
            return Ok((SCHEMA_VERSION.to_owned(), index));
        };

        if version != SCHEMA_VERSION {
            return Err(LogError::VersionMismatch {
                found: version,
                expected: SCHEMA_VERSION.to_owned(),
            });
        }

        let torn_at = {
            let mut scanner = RecordScanner::new(backend, first_record)?;
            for scanned in scanner.by_ref() {
                let scanned = scanned?;
                let record = scanned.record;
                index.insert(
                    record.time,
                    &record.topic,
                    &record.type_name,
                    scanned.offset,
                    scanned.len,
                );
            }
            scanner.torn_at()
        };

        if let Some(offset) = torn_at {
            warn!(?destination, offset, "ignoring incomplete trailing record");
            if mode.is_writable() {
                backend.truncate(offset)?;
            }
        }

        Ok((version, index))
    }
}

/// Deletes a store created by a failed open, along with its lock file.
fn remove_created(path: &Path, lock: Option<WriterLock>) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "could not remove store created by failed open");
    }
    if let Some(lock) = lock {
        let lock_path = lock.path().to_path_buf();
        if let Err(e) = lock.remove() {
            warn!(path = %lock_path.display(), error = %e, "could not remove lock file");
        }
    }
}

/// Handle to a message log.
///
/// A handle starts closed; [`Log::open`] attaches it to a store and
/// [`Log::close`] (or dropping it) detaches it. Inserts and queries take
/// `&self` and may run concurrently from several threads.
///
/// ```rust
/// use std::collections::HashSet;
/// use translog_core::{Log, OpenMode, Timestamp};
///
/// let mut log = Log::new();
/// log.open(":memory:", OpenMode::ReadWrite).unwrap();
/// log.insert_message(Timestamp::new(1, 0), "/a", "T", b"one").unwrap();
/// log.insert_message(Timestamp::new(2, 0), "/b", "T", b"two").unwrap();
///
/// let topics = HashSet::from(["/b".to_owned()]);
/// let found: Vec<_> = log
///     .query_messages(&topics)
///     .unwrap()
///     .map(|m| m.unwrap().into_data())
///     .collect();
/// assert_eq!(found, vec![b"two".to_vec()]);
/// ```
#[derive(Default)]
pub struct Log {
    state: Option<OpenLog>,
}

impl Log {
    /// Creates a closed handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh process-local store for writing.
    ///
    /// # Errors
    ///
    /// Only fails if the header cannot be written.
    pub fn open_in_memory() -> LogResult<Self> {
        let mut log = Self::new();
        log.open(Destination::Memory, OpenMode::ReadWrite)?;
        Ok(log)
    }

    /// Opens `destination` with the default [`LogConfig`].
    ///
    /// # Errors
    ///
    /// See [`Log::open_with_config`].
    pub fn open(&mut self, destination: impl Into<Destination>, mode: OpenMode) -> LogResult<()> {
        self.open_with_config(destination, mode, &LogConfig::default())
    }

    /// Attaches the handle to a store.
    ///
    /// `":memory:"` names a store that lives and dies with this handle.
    /// [`OpenMode::ReadWrite`] creates a missing file and takes the writer
    /// lock; [`OpenMode::Read`] requires an existing store. A new store gets a
    /// header carrying [`SCHEMA_VERSION`].
    ///
    /// # Errors
    ///
    /// - [`LogError::AlreadyOpen`] if the handle is open
    /// - [`LogError::Locked`] if another handle is writing the store
    /// - [`LogError::VersionMismatch`] if the store has another schema version
    /// - a format, corruption or I/O error if the store cannot be read
    ///
    /// On error the handle is unchanged.
    pub fn open_with_config(
        &mut self,
        destination: impl Into<Destination>,
        mode: OpenMode,
        config: &LogConfig,
    ) -> LogResult<()> {
        if self.state.is_some() {
            return Err(LogError::AlreadyOpen);
        }
        let destination = destination.into();
        let state = OpenLog::open(destination, mode, config)?;
        debug!(
            destination = ?state.destination,
            ?mode,
            records = state.shared.index().len(),
            "opened log"
        );
        self.state = Some(state);
        Ok(())
    }

    /// Whether the handle is attached to a store.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Schema version of the open store.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.version.as_str())
    }

    /// The destination the handle is attached to.
    #[must_use]
    pub fn destination(&self) -> Option<&Destination> {
        self.state.as_ref().map(|s| &s.destination)
    }

    fn state(&self) -> LogResult<&OpenLog> {
        self.state.as_ref().ok_or(LogError::Closed)
    }

    /// Appends one message.
    ///
    /// A topic without a leading `/` gets one. The message is visible to
    /// queries issued after this returns.
    ///
    /// # Errors
    ///
    /// Fails on a closed or read-only log, an empty topic or type, or a
    /// storage error. A failed insert leaves earlier records untouched.
    pub fn insert_message(
        &self,
        time: Timestamp,
        topic: &str,
        type_name: &str,
        data: &[u8],
    ) -> LogResult<()> {
        let state = self.state()?;
        if !state.mode.is_writable() {
            return Err(LogError::ReadOnly);
        }
        if topic.is_empty() {
            return Err(LogError::invalid_argument("topic must not be empty"));
        }
        if type_name.is_empty() {
            return Err(LogError::invalid_argument("type name must not be empty"));
        }

        let topic = with_leading_slash(topic);
        let frame = encode_record(time, &topic, type_name, data)?;
        let len = u32::try_from(frame.len())
            .map_err(|_| LogError::invalid_argument("record larger than 4 GiB"))?;

        let mut backend = state.shared.backend.lock();
        let offset = backend.append(&frame)?;
        if state.sync_on_insert {
            if let Err(e) = backend.flush().and_then(|()| backend.sync()) {
                if let Err(undo) = backend.truncate(offset) {
                    warn!(offset, error = %undo, "could not roll back failed insert");
                }
                return Err(e.into());
            }
        }
        state
            .shared
            .index
            .write()
            .insert(time, &topic, type_name, offset, len);
        Ok(())
    }

    /// Every message, oldest first. Equal timestamps keep insertion order.
    ///
    /// # Errors
    ///
    /// [`LogError::Closed`], or a read error on the first match.
    pub fn all_messages(&self) -> LogResult<MsgIter> {
        self.query(&TopicFilter::All, TimeRange::all())
    }

    /// Messages whose topic is in `topics`, oldest first.
    ///
    /// Names without a leading `/` are matched as if they had one. An empty
    /// set yields the end sentinel.
    ///
    /// # Errors
    ///
    /// As for [`Log::all_messages`].
    pub fn query_messages(&self, topics: &HashSet<String>) -> LogResult<MsgIter> {
        self.query(&TopicFilter::Topics(topics.clone()), TimeRange::all())
    }

    /// Messages whose whole topic matches `pattern`, oldest first.
    ///
    /// # Errors
    ///
    /// As for [`Log::all_messages`].
    pub fn query_messages_matching(&self, pattern: &TopicPattern) -> LogResult<MsgIter> {
        self.query(&TopicFilter::Pattern(pattern.clone()), TimeRange::all())
    }

    /// Messages selected by `filter` with a time inside `range`, oldest first.
    ///
    /// # Errors
    ///
    /// As for [`Log::all_messages`].
    pub fn query(&self, filter: &TopicFilter, range: TimeRange) -> LogResult<MsgIter> {
        let state = self.state()?;
        MsgIter::start(Arc::clone(&state.shared), filter, range)
    }

    /// Distinct `(topic, type)` pairs in the store, sorted.
    ///
    /// # Errors
    ///
    /// [`LogError::Closed`].
    pub fn topics(&self) -> LogResult<Vec<MessageInfo>> {
        Ok(self.state()?.shared.index().topics())
    }

    /// Number of stored messages.
    ///
    /// # Errors
    ///
    /// [`LogError::Closed`].
    pub fn message_count(&self) -> LogResult<usize> {
        Ok(self.state()?.shared.index().len())
    }

    /// Flushes, syncs and detaches from the store, releasing the writer lock.
    ///
    /// Closing a closed handle does nothing. Iterators created earlier stay
    /// usable.
    ///
    /// # Errors
    ///
    /// Fails if the final flush or sync fails; the handle is closed anyway.
    pub fn close(&mut self) -> LogResult<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        if state.mode.is_writable() {
            let mut backend = state.shared.backend.lock();
            backend.flush()?;
            backend.sync()?;
        }
        debug!(destination = ?state.destination, "closed log");
        Ok(())
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "error closing log on drop");
        }
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            None => f.write_str("Log(closed)"),
            Some(state) => f
                .debug_struct("Log")
                .field("destination", &state.destination)
                .field("mode", &state.mode)
                .field("version", &state.version)
                .finish_non_exhaustive(),
        }
    }
}
