//! Property-based test generators using proptest.

use proptest::prelude::*;
use translog_core::Timestamp;

/// Strategy for generating topic names the bus accepts.
pub fn topic_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("(/[a-z][a-z0-9_]{0,7}){1,3}").expect("Invalid regex")
}

/// Strategy for generating message type names.
pub fn type_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}(\\.[A-Z][a-zA-Z0-9]{0,7}){1,2}").expect("Invalid regex")
}

/// Strategy for generating timestamps within a few seconds of each other, so
/// ties and reorderings are common.
pub fn timestamp_strategy() -> impl Strategy<Value = Timestamp> {
    (0i64..8, prop_oneof![Just(0u32), 0u32..1_000_000_000])
        .prop_map(|(sec, nsec)| Timestamp::new(sec, nsec))
}

/// Strategy for generating payloads (arbitrary bytes).
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// One message to insert: `(time, topic, type, payload)`.
pub type GeneratedMessage = (Timestamp, String, String, Vec<u8>);

/// Strategy for generating a batch of messages over a small topic set.
pub fn message_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<GeneratedMessage>> {
    prop::collection::vec(topic_strategy(), 1..4).prop_flat_map(move |topics| {
        let message = (
            timestamp_strategy(),
            prop::sample::select(topics),
            type_name_strategy(),
            payload_strategy(),
        );
        prop::collection::vec(message, 0..max_len)
    })
}
