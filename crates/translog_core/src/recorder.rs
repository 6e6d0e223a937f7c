//! Records messages from a [`Node`] into a [`Log`].
//!
//! A recording session owns one open log and a set of subscriptions. Every
//! subscription callback holds an `Arc` to the session's shared state, so a
//! callback that fires while the session is being torn down finds the log
//! already taken and writes nothing.

use crate::config::{Destination, LogConfig, OpenMode};
use crate::error::LogError;
use crate::log::Log;
use crate::message_info::MessageInfo;
use crate::node::{normalize_topic, MessageCallback, Node, NodeError, NodeResult, SubscriptionId};
use crate::types::{Timestamp, TopicPattern};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by a [`Recorder`].
#[derive(Debug, Error)]
pub enum RecorderError {
    /// A session is running; stop it first.
    #[error("recorder is already recording")]
    AlreadyRecording,

    /// `start` was called with no topics and no patterns.
    #[error("no topics or patterns to record")]
    EmptyCriteria,

    /// A topic pattern did not compile.
    #[error("invalid topic pattern: {0}")]
    InvalidPattern(String),

    /// A topic name was refused.
    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),

    /// The log could not be opened.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// The node refused a subscription.
    #[error("subscription error: {0}")]
    Subscription(#[from] NodeError),
}

/// Message counts of the current or most recent session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    /// Messages written to the log.
    pub recorded: u64,
    /// Messages delivered but not written.
    pub failed: u64,
}

#[derive(Default)]
struct Subscriptions {
    active: bool,
    by_topic: HashMap<String, SubscriptionId>,
}

struct SessionShared {
    node: Arc<dyn Node>,
    patterns: Vec<TopicPattern>,
    log: Mutex<Option<Log>>,
    subscriptions: Mutex<Subscriptions>,
    recorded: AtomicU64,
    failed: AtomicU64,
}

impl SessionShared {
    fn on_message(&self, data: &[u8], info: &MessageInfo) {
        let log = self.log.lock();
        let Some(log) = log.as_ref() else {
            return;
        };
        match log.insert_message(Timestamp::now(), info.topic(), info.type_name(), data) {
            Ok(()) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(topic = info.topic(), error = %e, "failed to record message");
            }
        }
    }

    fn matches_pattern(&self, topic: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(topic))
    }

    /// Subscribes to `topic` unless already subscribed or shutting down.
    fn subscribe_topic(self: &Arc<Self>, topic: &str) -> NodeResult<()> {
        let mut subs = self.subscriptions.lock();
        if !subs.active || subs.by_topic.contains_key(topic) {
            return Ok(());
        }
        let shared = Arc::clone(self);
        let callback: MessageCallback =
            Arc::new(move |data: &[u8], info: &MessageInfo| shared.on_message(data, info));
        let id = self.node.subscribe(topic, callback)?;
        subs.by_topic.insert(topic.to_owned(), id);
        debug!(topic, "recorder subscribed");
        Ok(())
    }

    fn stats(&self) -> RecorderStats {
        RecorderStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Session {
    shared: Arc<SessionShared>,
    advertise_listener: Option<SubscriptionId>,
}

impl Session {
    fn subscribe_all(&mut self, topics: &BTreeSet<String>) -> NodeResult<()> {
        let node = Arc::clone(&self.shared.node);

        if !self.shared.patterns.is_empty() {
            let shared = Arc::clone(&self.shared);
            let id = node.on_advertise(Arc::new(move |info: &MessageInfo| {
                if shared.matches_pattern(info.topic()) {
                    if let Err(e) = shared.subscribe_topic(info.topic()) {
                        warn!(topic = info.topic(), error = %e, "could not subscribe to advertised topic");
                    }
                }
            }));
            self.advertise_listener = Some(id);

            for info in node.advertised_topics() {
                if self.shared.matches_pattern(info.topic()) {
                    self.shared.subscribe_topic(info.topic())?;
                }
            }
        }

        for topic in topics {
            self.shared.subscribe_topic(topic)?;
        }
        Ok(())
    }

    /// Detaches from the node and closes the log. Returns the final counts.
    fn shutdown(mut self) -> RecorderStats {
        let node = Arc::clone(&self.shared.node);
        if let Some(id) = self.advertise_listener.take() {
            node.remove_advertise_listener(id);
        }

        let ids: Vec<SubscriptionId> = {
            let mut subs = self.shared.subscriptions.lock();
            subs.active = false;
            subs.by_topic.drain().map(|(_, id)| id).collect()
        };
        for id in ids {
            if let Err(e) = node.unsubscribe(id) {
                warn!(error = %e, "could not unsubscribe recorder");
            }
        }

        // Waits for an in-flight insert; later callbacks find no log.
        let log = self.shared.log.lock().take();
        if let Some(mut log) = log {
            if let Err(e) = log.close() {
                warn!(error = %e, "error closing recorded log");
            }
        }

        let stats = self.shared.stats();
        debug!(recorded = stats.recorded, failed = stats.failed, "recorder stopped");
        stats
    }
}

/// Subscribes to topics and topic patterns and writes every delivered message
/// into a log.
///
/// Topics and patterns are configured before [`Recorder::start`]. Exact topics
/// are subscribed by name whether or not anyone publishes them yet; patterns
/// are matched against topics already advertised and against every topic
/// advertised while recording. A topic selected several ways is recorded once.
///
/// Deliveries are written on the delivering thread. When the log is slower
/// than the publishers, publishing blocks; nothing is buffered or dropped.
///
/// ```rust
/// use std::sync::Arc;
/// use translog_core::{LocalNode, Log, OpenMode, Recorder};
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("run.tlog");
/// let node = LocalNode::new();
///
/// let mut recorder = Recorder::new(Arc::new(node.clone()));
/// recorder.add_topic("/chatter").unwrap();
/// recorder.start(&path).unwrap();
///
/// node.advertise("/chatter", "example.Text").unwrap().publish(b"hi");
/// recorder.stop();
///
/// let mut log = Log::new();
/// log.open(&path, OpenMode::Read).unwrap();
/// assert_eq!(log.message_count().unwrap(), 1);
/// ```
pub struct Recorder {
    node: Arc<dyn Node>,
    topics: BTreeSet<String>,
    patterns: Vec<TopicPattern>,
    session: Option<Session>,
    last_stats: RecorderStats,
}

impl Recorder {
    /// Creates an idle recorder on `node`.
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self {
            node,
            topics: BTreeSet::new(),
            patterns: Vec::new(),
            session: None,
            last_stats: RecorderStats::default(),
        }
    }

    /// Adds an exact topic. A missing leading `/` is added.
    ///
    /// # Errors
    ///
    /// [`RecorderError::AlreadyRecording`] while a session runs, or
    /// [`RecorderError::InvalidTopic`].
    pub fn add_topic(&mut self, topic: &str) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let topic =
            normalize_topic(topic).ok_or_else(|| RecorderError::InvalidTopic(topic.to_owned()))?;
        self.topics.insert(topic);
        Ok(())
    }

    /// Adds a regular expression that must match a whole topic name.
    ///
    /// # Errors
    ///
    /// [`RecorderError::AlreadyRecording`] while a session runs, or
    /// [`RecorderError::InvalidPattern`].
    pub fn add_topic_pattern(&mut self, pattern: &str) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        let pattern =
            TopicPattern::new(pattern).map_err(|e| RecorderError::InvalidPattern(e.to_string()))?;
        if !self.patterns.contains(&pattern) {
            self.patterns.push(pattern);
        }
        Ok(())
    }

    /// Exact topics configured so far.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    /// Patterns configured so far.
    #[must_use]
    pub fn patterns(&self) -> &[TopicPattern] {
        &self.patterns
    }

    /// Starts recording into `destination` with the default [`LogConfig`].
    ///
    /// # Errors
    ///
    /// See [`Recorder::start_with_config`].
    pub fn start(&mut self, destination: impl Into<Destination>) -> Result<(), RecorderError> {
        self.start_with_config(destination, &LogConfig::default())
    }

    /// Opens the log for writing and subscribes.
    ///
    /// # Errors
    ///
    /// - [`RecorderError::AlreadyRecording`] if a session runs
    /// - [`RecorderError::EmptyCriteria`] with no topics and no patterns
    /// - [`RecorderError::Log`] if the log cannot be opened
    /// - [`RecorderError::Subscription`] if the node refuses a subscription
    ///
    /// On error nothing stays subscribed and the log is closed.
    pub fn start_with_config(
        &mut self,
        destination: impl Into<Destination>,
        config: &LogConfig,
    ) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        if self.topics.is_empty() && self.patterns.is_empty() {
            return Err(RecorderError::EmptyCriteria);
        }

        let destination = destination.into();
        let mut log = Log::new();
        log.open_with_config(destination.clone(), OpenMode::ReadWrite, config)?;

        let mut session = Session {
            shared: Arc::new(SessionShared {
                node: Arc::clone(&self.node),
                patterns: self.patterns.clone(),
                log: Mutex::new(Some(log)),
                subscriptions: Mutex::new(Subscriptions {
                    active: true,
                    by_topic: HashMap::new(),
                }),
                recorded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
            advertise_listener: None,
        };

        if let Err(e) = session.subscribe_all(&self.topics) {
            warn!(error = %e, "rolling back recorder start");
            session.shutdown();
            return Err(e.into());
        }

        debug!(
            ?destination,
            topics = self.topics.len(),
            patterns = self.patterns.len(),
            "recorder started"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Whether a session is running.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Counts for the running session, or the last one once stopped.
    #[must_use]
    pub fn stats(&self) -> RecorderStats {
        self.session
            .as_ref()
            .map_or(self.last_stats, |s| s.shared.stats())
    }

    /// Unsubscribes everything and closes the log.
    ///
    /// Waits for a write already in progress; no write happens after this
    /// returns. Stopping an idle recorder does nothing.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            self.last_stats = session.shutdown();
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("topics", &self.topics)
            .field("patterns", &self.patterns)
            .field("recording", &self.is_recording())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LocalNode;
    use tempfile::tempdir;

    fn recorded(path: &std::path::Path) -> Vec<(String, Vec<u8>)> {
        let mut log = Log::new();
        log.open(path, OpenMode::Read).unwrap();
        log.all_messages()
            .unwrap()
            .map(|m| {
                let m = m.unwrap();
                (m.topic().to_owned(), m.data().to_vec())
            })
            .collect()
    }

    #[test]
    fn start_requires_criteria() {
        let dir = tempdir().unwrap();
        let mut recorder = Recorder::new(Arc::new(LocalNode::new()));
        assert!(matches!(
            recorder.start(dir.path().join("r.tlog")),
            Err(RecorderError::EmptyCriteria)
        ));
        assert!(!recorder.is_recording());
    }

    #[test]
    fn configuration_is_frozen_while_recording() {
        let dir = tempdir().unwrap();
        let mut recorder = Recorder::new(Arc::new(LocalNode::new()));
        recorder.add_topic("a").unwrap();
        recorder.start(dir.path().join("r.tlog")).unwrap();

        assert!(matches!(
            recorder.add_topic("/b"),
            Err(RecorderError::AlreadyRecording)
        ));
        assert!(matches!(
            recorder.add_topic_pattern(".*"),
            Err(RecorderError::AlreadyRecording)
        ));
        assert!(matches!(
            recorder.start(dir.path().join("other.tlog")),
            Err(RecorderError::AlreadyRecording)
        ));

        recorder.stop();
        recorder.add_topic("/b").unwrap();
        assert_eq!(recorder.topics().collect::<Vec<_>>(), vec!["/a", "/b"]);
    }

    #[test]
    fn bad_criteria_are_rejected() {
        let mut recorder = Recorder::new(Arc::new(LocalNode::new()));
        assert!(matches!(
            recorder.add_topic_pattern("(unclosed"),
            Err(RecorderError::InvalidPattern(_))
        ));
        assert!(matches!(
            recorder.add_topic(""),
            Err(RecorderError::InvalidTopic(_))
        ));
        recorder.add_topic_pattern(".*").unwrap();
        recorder.add_topic_pattern(".*").unwrap();
        assert_eq!(recorder.patterns().len(), 1);
    }

    #[test]
    fn records_exact_topics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.tlog");
        let node = LocalNode::new();
        let mut recorder = Recorder::new(Arc::new(node.clone()));
        recorder.add_topic("/a").unwrap();
        recorder.start(&path).unwrap();

        let a = node.advertise("/a", "T").unwrap();
        let b = node.advertise("/b", "T").unwrap();
        for i in 0u8..5 {
            a.publish(&[i]);
            b.publish(&[i]);
        }
        assert_eq!(recorder.stats().recorded, 5);
        recorder.stop();

        let messages = recorded(&path);
        assert_eq!(messages.len(), 5);
        assert!(messages.iter().all(|(topic, _)| topic == "/a"));
        let payloads: Vec<u8> = messages.iter().map(|(_, d)| d[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn patterns_pick_up_late_topics() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.tlog");
        let node = LocalNode::new();
        let early = node.advertise("/foo_early", "T").unwrap();

        let mut recorder = Recorder::new(Arc::new(node.clone()));
        recorder.add_topic_pattern(".*foo.*").unwrap();
        recorder.start(&path).unwrap();

        let late = node.advertise("/foo_late", "T").unwrap();
        let other = node.advertise("/bar", "T").unwrap();
        early.publish(b"1");
        late.publish(b"2");
        other.publish(b"3");
        recorder.stop();

        let topics: Vec<_> = recorded(&path).into_iter().map(|(t, _)| t).collect();
        assert_eq!(topics, vec!["/foo_early", "/foo_late"]);
    }

    #[test]
    fn overlapping_criteria_record_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.tlog");
        let node = LocalNode::new();
        let mut recorder = Recorder::new(Arc::new(node.clone()));
        recorder.add_topic("/foo").unwrap();
        recorder.add_topic_pattern(".*").unwrap();
        recorder.add_topic_pattern("/f.*").unwrap();
        recorder.start(&path).unwrap();

        node.advertise("/foo", "T").unwrap().publish(b"x");
        recorder.stop();
        assert_eq!(recorded(&path).len(), 1);
    }

    #[test]
    fn stop_detaches_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.tlog");
        let node = LocalNode::new();
        let mut recorder = Recorder::new(Arc::new(node.clone()));
        recorder.add_topic("/a").unwrap();
        recorder.add_topic_pattern("/p.*").unwrap();
        recorder.start(&path).unwrap();

        let publisher = node.advertise("/a", "T").unwrap();
        publisher.publish(b"kept");
        recorder.stop();
        recorder.stop();

        assert_eq!(node.subscription_count(), 0);
        publisher.publish(b"dropped");
        node.advertise("/p1", "T").unwrap().publish(b"dropped");
        assert_eq!(node.subscription_count(), 0);
        assert_eq!(recorder.stats(), RecorderStats { recorded: 1, failed: 0 });
        assert_eq!(recorded(&path).len(), 1);
    }

    #[test]
    fn failed_start_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let node = LocalNode::new();
        let mut recorder = Recorder::new(Arc::new(node.clone()));
        recorder.add_topic("/a").unwrap();

        let bad = dir.path().join("missing").join("r.tlog");
        assert!(matches!(recorder.start(&bad), Err(RecorderError::Log(_))));
        assert!(!recorder.is_recording());
        assert_eq!(node.subscription_count(), 0);

        recorder.start(dir.path().join("r.tlog")).unwrap();
        assert!(recorder.is_recording());
        assert_eq!(node.subscription_count(), 1);
    }

    #[test]
    fn locked_destination_fails_start() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.tlog");
        let mut holder = Log::new();
        holder.open(&path, OpenMode::ReadWrite).unwrap();

        let mut recorder = Recorder::new(Arc::new(LocalNode::new()));
        recorder.add_topic("/a").unwrap();
        assert!(matches!(
            recorder.start(&path),
            Err(RecorderError::Log(LogError::Locked))
        ));
    }

    #[test]
    fn drop_stops_recording() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.tlog");
        let node = LocalNode::new();
        {
            let mut recorder = Recorder::new(Arc::new(node.clone()));
            recorder.add_topic("/a").unwrap();
            recorder.start(&path).unwrap();
            node.advertise("/a", "T").unwrap().publish(b"x");
        }
        assert_eq!(node.subscription_count(), 0);
        assert_eq!(recorded(&path).len(), 1);
    }
}
