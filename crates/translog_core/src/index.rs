//! In-memory time and topic index over the records of an open store.
//!
//! Entries are kept sorted by `(time, seq)`, where `seq` is the insertion
//! counter. Topic names are interned so a query resolves its topic filter to
//! a set of ids once and then skips foreign records without touching storage.

use crate::message_info::MessageInfo;
use crate::types::{TimeRange, Timestamp, TopicPattern};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap, HashSet};

pub(crate) type TopicId = u32;

/// Location of one record plus the keys it is ordered and filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub time: Timestamp,
    pub seq: u64,
    pub offset: u64,
    pub len: u32,
    pub topic: TopicId,
}

impl IndexEntry {
    pub(crate) fn key(&self) -> (Timestamp, u64) {
        (self.time, self.seq)
    }
}

/// Which topics a query returns.
#[derive(Debug, Clone, Default)]
pub enum TopicFilter {
    /// Every topic.
    #[default]
    All,
    /// Topics named exactly. A name without a leading `/` selects the
    /// topic with one.
    Topics(HashSet<String>),
    /// Topics fully matching a pattern.
    Pattern(TopicPattern),
}

impl TopicFilter {
    /// Whether `topic` is selected.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self {
            Self::All => true,
            Self::Topics(names) => names.iter().any(|n| with_leading_slash(n) == topic),
            Self::Pattern(pattern) => pattern.matches(topic),
        }
    }
}

/// A [`TopicFilter`] resolved against the topic table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selection {
    All,
    Ids(HashSet<TopicId>),
    Nothing,
}

impl Selection {
    fn contains(&self, id: TopicId) -> bool {
        match self {
            Self::All => true,
            Self::Ids(ids) => ids.contains(&id),
            Self::Nothing => false,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MessageIndex {
    entries: Vec<IndexEntry>,
    topic_ids: HashMap<String, TopicId>,
    topic_names: Vec<String>,
    /// Type names seen per topic id.
    topic_types: Vec<Vec<String>>,
    next_seq: u64,
}

impl MessageIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a message stored at `offset` and returns its sequence number.
    pub(crate) fn insert(
        &mut self,
        time: Timestamp,
        topic: &str,
        type_name: &str,
        offset: u64,
        len: u32,
    ) -> u64 {
        let topic_id = self.intern(topic);
        let types = &mut self.topic_types[topic_id as usize];
        if !types.iter().any(|t| t == type_name) {
            types.push(type_name.to_owned());
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = IndexEntry {
            time,
            seq,
            offset,
            len,
            topic: topic_id,
        };
        // Appending in time order is the common case and stays O(1).
        let pos = self.entries.partition_point(|e| e.time <= time);
        if pos == self.entries.len() {
            self.entries.push(entry);
        } else {
            self.entries.insert(pos, entry);
        }
        seq
    }

    fn intern(&mut self, topic: &str) -> TopicId {
        if let Some(&id) = self.topic_ids.get(topic) {
            return id;
        }
        let id = self.topic_names.len() as TopicId;
        self.topic_names.push(topic.to_owned());
        self.topic_types.push(Vec::new());
        self.topic_ids.insert(topic.to_owned(), id);
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sequence number the next insert will receive. Records with a lower
    /// number are visible to a query that snapshots this value.
    pub(crate) fn snapshot(&self) -> u64 {
        self.next_seq
    }

    /// Distinct `(topic, type)` pairs, sorted.
    pub(crate) fn topics(&self) -> Vec<MessageInfo> {
        let pairs: BTreeSet<(&str, &str)> = self
            .topic_names
            .iter()
            .zip(&self.topic_types)
            .flat_map(|(topic, types)| types.iter().map(move |ty| (topic.as_str(), ty.as_str())))
            .collect();
        pairs
            .into_iter()
            .map(|(topic, type_name)| MessageInfo::new(topic, type_name))
            .collect()
    }

    pub(crate) fn resolve(&self, filter: &TopicFilter) -> Selection {
        let ids: HashSet<TopicId> = match filter {
            TopicFilter::All => return Selection::All,
            TopicFilter::Topics(names) => names
                .iter()
                .filter_map(|name| self.topic_ids.get(&*with_leading_slash(name)).copied())
                .collect(),
            TopicFilter::Pattern(pattern) => self
                .topic_names
                .iter()
                .enumerate()
                .filter(|(_, name)| pattern.matches(name))
                .map(|(id, _)| id as TopicId)
                .collect(),
        };
        if ids.is_empty() {
            Selection::Nothing
        } else {
            Selection::Ids(ids)
        }
    }

    /// First entry ordered after `after` (or the first overall) that lies in
    /// `range`, is selected, and existed at `snapshot`.
    pub(crate) fn next_after(
        &self,
        after: Option<(Timestamp, u64)>,
        range: &TimeRange,
        selection: &Selection,
        snapshot: u64,
    ) -> Option<IndexEntry> {
        if *selection == Selection::Nothing || range.is_empty() {
            return None;
        }

        let from_range = match range.begin {
            Some(begin) => self.entries.partition_point(|e| e.time < begin),
            None => 0,
        };
        let from_cursor = match after {
            Some(key) => self.entries.partition_point(|e| e.key() <= key),
            None => 0,
        };

        self.entries[from_range.max(from_cursor)..]
            .iter()
            .take_while(|e| range.end.map_or(true, |end| e.time < end))
            .find(|e| e.seq < snapshot && selection.contains(e.topic))
            .copied()
    }
}

/// Canonical stored form of a topic name: a leading `/` is added when missing.
pub(crate) fn with_leading_slash(topic: &str) -> Cow<'_, str> {
    if topic.starts_with('/') {
        Cow::Borrowed(topic)
    } else {
        Cow::Owned(format!("/{topic}"))
    }
}
