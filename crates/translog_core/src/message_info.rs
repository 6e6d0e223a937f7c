//! Metadata delivered alongside every message.

/// Separator between partition and topic in the combined encoding.
const DELIMITER: char = '@';

/// Topic, message type and partition of a message.
///
/// All three fields default to empty, which is a valid state. The setters
/// store strings verbatim; the only parsing happens in
/// [`MessageInfo::set_topic_and_partition`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MessageInfo {
    topic: String,
    type_name: String,
    partition: String,
}

impl MessageInfo {
    /// Creates metadata for `topic` carrying messages of `type_name`.
    pub fn new(topic: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            type_name: type_name.into(),
            partition: String::new(),
        }
    }

    /// Topic name.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sets the topic name.
    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.topic = topic.into();
    }

    /// Name of the payload's wire type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Sets the payload's wire type.
    pub fn set_type_name(&mut self, type_name: impl Into<String>) {
        self.type_name = type_name.into();
    }

    /// Partition the message was published in.
    #[must_use]
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// Sets the partition.
    pub fn set_partition(&mut self, partition: impl Into<String>) {
        self.partition = partition.into();
    }

    /// Sets partition and topic from the combined `"@<partition>@<topic>"` form.
    ///
    /// The string must hold exactly two `@`, the first at position 0, and both
    /// segments must be non-empty and start with `/`. Anything else clears
    /// both fields, so a malformed value never leaves one of them stale.
    /// Returns whether the value was well formed.
    pub fn set_topic_and_partition(&mut self, combined: &str) -> bool {
        match split_combined(combined) {
            Some((partition, topic)) => {
                self.partition = partition.to_owned();
                self.topic = topic.to_owned();
                true
            }
            None => {
                self.partition.clear();
                self.topic.clear();
                false
            }
        }
    }

    /// The `"@<partition>@<topic>"` form, when both fields are set.
    #[must_use]
    pub fn topic_and_partition(&self) -> Option<String> {
        if self.partition.is_empty() || self.topic.is_empty() {
            return None;
        }
        Some(format!(
            "{DELIMITER}{}{DELIMITER}{}",
            self.partition, self.topic
        ))
    }
}

fn split_combined(combined: &str) -> Option<(&str, &str)> {
    let rest = combined.strip_prefix(DELIMITER)?;
    let (partition, topic) = rest.split_once(DELIMITER)?;
    if topic.contains(DELIMITER) {
        return None;
    }
    (partition.starts_with('/') && topic.starts_with('/')).then_some((partition, topic))
}
