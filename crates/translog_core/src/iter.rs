//! Lazy cursor over query results.

use crate::error::{LogError, LogResult};
use crate::index::{Selection, TopicFilter};
use crate::log::LogShared;
use crate::message_info::MessageInfo;
use crate::record::MessageRecord;
use crate::types::{TimeRange, Timestamp};
use std::fmt;
use std::sync::Arc;

/// A stored message as returned by a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    info: MessageInfo,
    time: Timestamp,
    data: Vec<u8>,
}

impl Message {
    /// Raw payload.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload as text, if it is valid UTF-8.
    #[must_use]
    pub fn data_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Topic the message was recorded from.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.info.topic()
    }

    /// Wire type of the payload.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.info.type_name()
    }

    /// Topic and type as metadata.
    #[must_use]
    pub fn info(&self) -> &MessageInfo {
        &self.info
    }

    /// When the message was captured.
    #[must_use]
    pub fn time_received(&self) -> Timestamp {
        self.time
    }

    /// Consumes the message, returning its payload.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            info: MessageInfo::new(record.topic, record.type_name),
            time: record.time,
            data: record.data,
        }
    }
}

struct Cursor {
    shared: Arc<LogShared>,
    selection: Selection,
    range: TimeRange,
    snapshot: u64,
    position: (Timestamp, u64),
    current: Message,
}

impl Cursor {
    /// Looks up the record after the current one and reads it.
    fn fetch_next(&self) -> LogResult<Option<((Timestamp, u64), Message)>> {
        let entry = self.shared.index().next_after(
            Some(self.position),
            &self.range,
            &self.selection,
            self.snapshot,
        );
        match entry {
            Some(entry) => Ok(Some((entry.key(), self.shared.read_message(&entry)?))),
            None => Ok(None),
        }
    }
}

/// Forward-only cursor over the results of one query.
///
/// A fresh iterator is positioned on its first match, or is the end sentinel
/// when nothing matched. Each step reads exactly one record from storage, so
/// memory use does not grow with the size of the result set.
///
/// The iterator sees the records that existed when the query was issued.
/// It holds its own reference to the store, so it stays usable after the
/// [`crate::Log`] that created it is closed.
///
/// ```rust
/// use translog_core::{Log, MsgIter, OpenMode, Timestamp};
///
/// let mut log = Log::new();
/// log.open(":memory:", OpenMode::ReadWrite).unwrap();
/// log.insert_message(Timestamp::new(1, 0), "/a", "T", b"one").unwrap();
///
/// let mut iter = log.all_messages().unwrap();
/// assert_eq!(iter.current().unwrap().data(), b"one");
/// iter.advance().unwrap();
/// assert!(iter.is_end());
/// assert_eq!(iter, MsgIter::end());
/// ```
#[derive(Default)]
pub struct MsgIter {
    cursor: Option<Box<Cursor>>,
    deferred: Option<LogError>,
}

impl MsgIter {
    /// The end sentinel.
    #[must_use]
    pub fn end() -> Self {
        Self::default()
    }

    pub(crate) fn start(
        shared: Arc<LogShared>,
        filter: &TopicFilter,
        range: TimeRange,
    ) -> LogResult<Self> {
        let (selection, snapshot, first) = {
            let index = shared.index();
            let selection = index.resolve(filter);
            let snapshot = index.snapshot();
            let first = index.next_after(None, &range, &selection, snapshot);
            (selection, snapshot, first)
        };

        let Some(first) = first else {
            return Ok(Self::end());
        };
        let current = shared.read_message(&first)?;

        Ok(Self {
            cursor: Some(Box::new(Cursor {
                shared,
                selection,
                range,
                snapshot,
                position: first.key(),
                current,
            })),
            deferred: None,
        })
    }

    /// Whether the iterator is past its last match.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.cursor.is_none()
    }

    /// The message under the cursor; `None` at the end.
    #[must_use]
    pub fn current(&self) -> Option<&Message> {
        self.cursor.as_ref().map(|c| &c.current)
    }

    /// Moves to the next match. Advancing the end sentinel does nothing.
    ///
    /// # Errors
    ///
    /// Fails if the next record cannot be read. The iterator is at its end
    /// afterwards.
    pub fn advance(&mut self) -> LogResult<()> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(());
        };
        match cursor.fetch_next() {
            Ok(Some((position, message))) => {
                cursor.position = position;
                cursor.current = message;
                Ok(())
            }
            Ok(None) => {
                self.cursor = None;
                Ok(())
            }
            Err(e) => {
                self.cursor = None;
                Err(e)
            }
        }
    }
}

impl Iterator for MsgIter {
    type Item = LogResult<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return Some(Err(e));
        }
        let cursor = self.cursor.as_mut()?;
        match cursor.fetch_next() {
            Ok(Some((position, message))) => {
                cursor.position = position;
                Some(Ok(std::mem::replace(&mut cursor.current, message)))
            }
            Ok(None) => self.cursor.take().map(|c| Ok(c.current)),
            Err(e) => {
                // Hand out the message we already hold; the error comes next.
                self.deferred = Some(e);
                self.cursor.take().map(|c| Ok(c.current))
            }
        }
    }
}

impl PartialEq for MsgIter {
    fn eq(&self, other: &Self) -> bool {
        match (&self.cursor, &other.cursor) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                Arc::ptr_eq(&a.shared, &b.shared)
                    && a.snapshot == b.snapshot
                    && a.position == b.position
            }
            _ => false,
        }
    }
}

impl fmt::Debug for MsgIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cursor {
            None => f.write_str("MsgIter(end)"),
            Some(c) => f
                .debug_struct("MsgIter")
                .field("topic", &c.current.topic())
                .field("time", &c.position.0)
                .field("seq", &c.position.1)
                .field("snapshot", &c.snapshot)
                .finish(),
        }
    }
}
