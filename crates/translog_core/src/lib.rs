//! # translog core
//!
//! Persistence and replay for a publish/subscribe transport.
//!
//! This crate provides:
//! - [`Log`], an embedded, schema-versioned store of time-stamped messages
//! - [`MsgIter`], the lazy cursor every log query returns
//! - [`MessageInfo`], the topic/type/partition metadata carried with a message
//! - [`Recorder`], which subscribes to topics and patterns on a [`Node`] and
//!   writes every delivered message into a log
//!
//! ```rust
//! use translog_core::{Log, OpenMode, Timestamp};
//!
//! let mut log = Log::new();
//! log.open(":memory:", OpenMode::ReadWrite).unwrap();
//! log.insert_message(Timestamp::new(1, 0), "/chatter", "example.Text", b"hi").unwrap();
//!
//! for message in log.all_messages().unwrap() {
//!     let message = message.unwrap();
//!     assert_eq!(message.topic(), "/chatter");
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod index;
mod iter;
mod lock;
mod log;
mod message_info;
mod node;
mod record;
mod recorder;
mod scan;
mod types;

pub use config::{Destination, LogConfig, OpenMode, MEMORY_DESTINATION, SCHEMA_PATH_ENV};
pub use error::{LogError, LogResult};
pub use index::TopicFilter;
pub use iter::{Message, MsgIter};
pub use log::{Log, SCHEMA_VERSION};
pub use message_info::MessageInfo;
pub use node::{
    normalize_topic, AdvertiseCallback, LocalNode, MessageCallback, Node, NodeError, NodeResult,
    Publisher, SubscriptionId,
};
pub use record::MessageRecord;
pub use recorder::{Recorder, RecorderError, RecorderStats};
pub use types::{TimeRange, Timestamp, TopicPattern};

/// Crate version, for tooling banners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
