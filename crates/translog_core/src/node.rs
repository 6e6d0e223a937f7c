//! The boundary to the publish/subscribe transport, plus an in-process bus.
//!
//! [`Node`] is everything the recorder needs from a transport: subscribe by
//! topic name, hear about newly advertised topics, and list the topics
//! already advertised. [`LocalNode`] implements it without any networking,
//! delivering on the publishing thread.

use crate::message_info::MessageInfo;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Called with the payload and metadata of every delivered message.
pub type MessageCallback = Arc<dyn Fn(&[u8], &MessageInfo) + Send + Sync>;

/// Called with the metadata of every newly advertised topic.
pub type AdvertiseCallback = Arc<dyn Fn(&MessageInfo) + Send + Sync>;

/// Handle returned by [`Node::subscribe`] and [`Node::on_advertise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Errors raised by a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The id was never handed out, or was already removed.
    #[error("unknown subscription {0:?}")]
    UnknownSubscription(SubscriptionId),

    /// The topic name is not acceptable to the transport.
    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),
}

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// A participant on the pub/sub bus.
pub trait Node: Send + Sync {
    /// Delivers every message later published on `topic` to `callback`.
    ///
    /// Works whether or not the topic has been advertised yet.
    fn subscribe(&self, topic: &str, callback: MessageCallback) -> NodeResult<SubscriptionId>;

    /// Stops a subscription.
    ///
    /// Waits for a delivery to this subscription that is already running on
    /// another thread; no delivery starts after this returns. A callback must
    /// not unsubscribe itself.
    fn unsubscribe(&self, id: SubscriptionId) -> NodeResult<()>;

    /// Calls `callback` for every topic advertised from now on, before any
    /// message is published on it.
    fn on_advertise(&self, callback: AdvertiseCallback) -> SubscriptionId;

    /// Removes a listener registered with [`Node::on_advertise`].
    fn remove_advertise_listener(&self, id: SubscriptionId);

    /// Topics advertised so far.
    fn advertised_topics(&self) -> Vec<MessageInfo>;
}

/// Canonical form of a topic name: a leading `/` is added when missing.
///
/// Returns `None` for names the bus refuses: empty, containing whitespace or
/// the partition delimiter `@`, or holding an empty segment (`//`).
#[must_use]
pub fn normalize_topic(topic: &str) -> Option<String> {
    let invalid = topic.is_empty()
        || topic == "/"
        || topic.contains('@')
        || topic.contains("//")
        || topic.chars().any(char::is_whitespace);
    if invalid {
        return None;
    }
    Some(if topic.starts_with('/') {
        topic.to_owned()
    } else {
        format!("/{topic}")
    })
}

/// One message subscription. Deliveries hold `active` for reading; removal
/// clears it under the write lock.
struct Subscriber {
    callback: MessageCallback,
    active: RwLock<bool>,
}

impl Subscriber {
    fn deliver(&self, data: &[u8], info: &MessageInfo) -> bool {
        let active = self.active.read_recursive();
        if *active {
            (self.callback)(data, info);
        }
        *active
    }
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: HashMap<String, Vec<(SubscriptionId, Arc<Subscriber>)>>,
    subscription_topics: HashMap<SubscriptionId, String>,
    listeners: Vec<(SubscriptionId, AdvertiseCallback)>,
    advertised: BTreeMap<String, MessageInfo>,
}

impl BusState {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

#[derive(Default)]
struct BusShared {
    partition: String,
    state: RwLock<BusState>,
}

/// An in-process bus.
///
/// Clones share the same bus. Message callbacks run on the publishing thread
/// and advertisement listeners run inside [`LocalNode::advertise`]; neither
/// runs while the bus lock is held, so callbacks may call back into the node
/// (other than to unsubscribe themselves).
#[derive(Clone, Default)]
pub struct LocalNode {
    shared: Arc<BusShared>,
}

impl LocalNode {
    /// Creates a bus with an empty partition.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus whose deliveries carry `partition`.
    #[must_use]
    pub fn with_partition(partition: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(BusShared {
                partition: partition.into(),
                state: RwLock::default(),
            }),
        }
    }

    /// Partition stamped on every delivered [`MessageInfo`].
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.shared.partition
    }

    /// Announces a publisher of `type_name` messages on `topic`.
    ///
    /// Advertisement listeners have run by the time this returns.
    ///
    /// # Errors
    ///
    /// [`NodeError::InvalidTopic`] if the name is refused by
    /// [`normalize_topic`].
    pub fn advertise(&self, topic: &str, type_name: &str) -> NodeResult<Publisher> {
        let topic = normalize_topic(topic).ok_or_else(|| NodeError::InvalidTopic(topic.to_owned()))?;
        let mut info = MessageInfo::new(topic.clone(), type_name);
        info.set_partition(self.shared.partition.clone());

        let (fresh, listeners) = {
            let mut state = self.shared.state.write();
            let fresh = !state.advertised.contains_key(&topic);
            if fresh {
                state.advertised.insert(topic.clone(), info.clone());
            }
            let listeners: Vec<AdvertiseCallback> =
                state.listeners.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (fresh, listeners)
        };

        if fresh {
            debug!(topic = %topic, type_name, "advertised topic");
            for listener in listeners {
                listener(&info);
            }
        }

        Ok(Publisher {
            shared: Arc::clone(&self.shared),
            info,
        })
    }

    /// Number of live message subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.shared.state.read().subscription_topics.len()
    }
}

impl Node for LocalNode {
    fn subscribe(&self, topic: &str, callback: MessageCallback) -> NodeResult<SubscriptionId> {
        let topic = normalize_topic(topic).ok_or_else(|| NodeError::InvalidTopic(topic.to_owned()))?;
        let mut state = self.shared.state.write();
        let id = state.next_id();
        let subscriber = Arc::new(Subscriber {
            callback,
            active: RwLock::new(true),
        });
        state
            .subscribers
            .entry(topic.clone())
            .or_default()
            .push((id, subscriber));
        state.subscription_topics.insert(id, topic);
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> NodeResult<()> {
        let removed = {
            let mut state = self.shared.state.write();
            let topic = state
                .subscription_topics
                .remove(&id)
                .ok_or(NodeError::UnknownSubscription(id))?;
            let mut removed = None;
            if let Some(list) = state.subscribers.get_mut(&topic) {
                if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                    removed = Some(list.remove(pos).1);
                }
                if list.is_empty() {
                    state.subscribers.remove(&topic);
                }
            }
            removed
        };

        if let Some(subscriber) = removed {
            *subscriber.active.write() = false;
        }
        Ok(())
    }

    fn on_advertise(&self, callback: AdvertiseCallback) -> SubscriptionId {
        let mut state = self.shared.state.write();
        let id = state.next_id();
        state.listeners.push((id, callback));
        id
    }

    fn remove_advertise_listener(&self, id: SubscriptionId) {
        self.shared.state.write().listeners.retain(|(lid, _)| *lid != id);
    }

    fn advertised_topics(&self) -> Vec<MessageInfo> {
        self.shared.state.read().advertised.values().cloned().collect()
    }
}

impl fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.read();
        f.debug_struct("LocalNode")
            .field("partition", &self.shared.partition)
            .field("advertised", &state.advertised.len())
            .field("subscriptions", &state.subscription_topics.len())
            .finish()
    }
}

/// Publishing end of an advertised topic.
#[derive(Clone)]
pub struct Publisher {
    shared: Arc<BusShared>,
    info: MessageInfo,
}

impl Publisher {
    /// Metadata attached to every message this publisher sends.
    #[must_use]
    pub fn info(&self) -> &MessageInfo {
        &self.info
    }

    /// Delivers `data` to every current subscriber of the topic, on this
    /// thread. Returns the number of deliveries.
    ///
    /// A subscriber removed while this call is delivering to others is
    /// skipped.
    pub fn publish(&self, data: &[u8]) -> usize {
        let subscribers: Vec<Arc<Subscriber>> = self
            .shared
            .state
            .read()
            .subscribers
            .get(self.info.topic())
            .map(|list| list.iter().map(|(_, sub)| Arc::clone(sub)).collect())
            .unwrap_or_default();

        let mut delivered = 0;
        for subscriber in &subscribers {
            if subscriber.deliver(data, &self.info) {
                delivered += 1;
            }
        }
        delivered
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").field("info", &self.info).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn collector() -> (MessageCallback, Arc<Mutex<Vec<(Vec<u8>, MessageInfo)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: MessageCallback = Arc::new(move |data: &[u8], info: &MessageInfo| {
            sink.lock().push((data.to_vec(), info.clone()));
        });
        (callback, seen)
    }

    #[test]
    fn normalizes_topic_names() {
        assert_eq!(normalize_topic("foo").as_deref(), Some("/foo"));
        assert_eq!(normalize_topic("/foo/bar").as_deref(), Some("/foo/bar"));
        for bad in ["", "/", "a b", "@/p@/t", "/a//b", "tab\there"] {
            assert_eq!(normalize_topic(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn subscribe_before_advertise_receives() {
        let node = LocalNode::new();
        let (callback, seen) = collector();
        node.subscribe("chatter", callback).unwrap();

        let publisher = node.advertise("/chatter", "example.Text").unwrap();
        assert_eq!(publisher.publish(b"hello"), 1);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, b"hello");
        assert_eq!(seen[0].1.topic(), "/chatter");
        assert_eq!(seen[0].1.type_name(), "example.Text");
    }

    #[test]
    fn other_topics_are_not_delivered() {
        let node = LocalNode::new();
        let (callback, seen) = collector();
        node.subscribe("/a", callback).unwrap();
        assert_eq!(node.advertise("/b", "T").unwrap().publish(b"x"), 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let node = LocalNode::new();
        let (callback, seen) = collector();
        let id = node.subscribe("/a", callback).unwrap();
        let publisher = node.advertise("/a", "T").unwrap();
        publisher.publish(b"1");

        node.unsubscribe(id).unwrap();
        publisher.publish(b"2");
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(node.subscription_count(), 0);
        assert_eq!(
            node.unsubscribe(id),
            Err(NodeError::UnknownSubscription(id))
        );
    }

    /// A callback that signals when it starts and then waits to be released.
    fn blocking_callback() -> (MessageCallback, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let callback: MessageCallback = Arc::new(move |_: &[u8], _: &MessageInfo| {
            entered_tx.send(()).unwrap();
            release_rx.lock().recv().unwrap();
        });
        (callback, entered_rx, release_tx)
    }

    #[test]
    fn removed_subscriber_is_skipped_mid_publish() {
        let node = LocalNode::new();
        let (blocking, entered, release) = blocking_callback();
        node.subscribe("/a", blocking).unwrap();
        let (callback, seen) = collector();
        let later = node.subscribe("/a", callback).unwrap();

        let publisher = node.advertise("/a", "T").unwrap();
        let publishing = std::thread::spawn(move || publisher.publish(b"x"));
        entered.recv().unwrap();
        node.unsubscribe(later).unwrap();
        release.send(()).unwrap();

        assert_eq!(publishing.join().unwrap(), 1);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unsubscribe_waits_for_running_delivery() {
        let node = LocalNode::new();
        let (blocking, entered, release) = blocking_callback();
        let id = node.subscribe("/a", blocking).unwrap();

        let publisher = node.advertise("/a", "T").unwrap();
        let publishing = std::thread::spawn(move || publisher.publish(b"x"));
        entered.recv().unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let unsubscribing = {
            let node = node.clone();
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                node.unsubscribe(id).unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        release.send(()).unwrap();
        unsubscribing.join().unwrap();
        assert_eq!(publishing.join().unwrap(), 1);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(node.subscription_count(), 0);
    }

    #[test]
    fn invalid_topics_are_rejected() {
        let node = LocalNode::new();
        let (callback, _) = collector();
        assert!(matches!(
            node.subscribe("", callback),
            Err(NodeError::InvalidTopic(_))
        ));
        assert!(matches!(
            node.advertise("a b", "T"),
            Err(NodeError::InvalidTopic(_))
        ));
    }

    #[test]
    fn listeners_hear_new_topics_once() {
        let node = LocalNode::new();
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&heard);
        let id = node.on_advertise(Arc::new(move |info: &MessageInfo| {
            sink.lock().push(info.topic().to_owned());
        }));

        node.advertise("/a", "T").unwrap();
        node.advertise("/a", "T").unwrap();
        node.advertise("/b", "T").unwrap();
        assert_eq!(*heard.lock(), vec!["/a", "/b"]);

        node.remove_advertise_listener(id);
        node.advertise("/c", "T").unwrap();
        assert_eq!(heard.lock().len(), 2);
        assert_eq!(node.advertised_topics().len(), 3);
    }

    #[test]
    fn listener_may_subscribe_reentrantly() {
        let node = LocalNode::new();
        let (callback, seen) = collector();
        let inner = node.clone();
        node.on_advertise(Arc::new(move |info: &MessageInfo| {
            inner.subscribe(info.topic(), Arc::clone(&callback)).unwrap();
        }));

        let publisher = node.advertise("/late", "T").unwrap();
        publisher.publish(b"first");
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn partition_is_stamped_on_deliveries() {
        let node = LocalNode::with_partition("/robots");
        let (callback, seen) = collector();
        node.subscribe("/a", callback).unwrap();
        node.advertise("/a", "T").unwrap().publish(b"");

        let info = &seen.lock()[0].1;
        assert_eq!(info.partition(), "/robots");
        assert_eq!(info.topic_and_partition().as_deref(), Some("@/robots@/a"));
        assert_eq!(node.advertised_topics()[0].partition(), "/robots");
    }

    #[test]
    fn callbacks_run_on_publishing_thread() {
        let node = LocalNode::new();
        let thread = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&thread);
        node.subscribe(
            "/a",
            Arc::new(move |_: &[u8], _: &MessageInfo| {
                *sink.lock() = Some(std::thread::current().id());
            }),
        )
        .unwrap();

        let publisher = node.advertise("/a", "T").unwrap();
        let publisher_thread = std::thread::spawn(move || {
            publisher.publish(b"");
            std::thread::current().id()
        })
        .join()
        .unwrap();
        assert_eq!(*thread.lock(), Some(publisher_thread));
    }
}
