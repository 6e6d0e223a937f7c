//! Shared helpers for the translog benchmarks.

use rand::Rng;
use translog_core::{Log, LogResult, Timestamp};

/// Random payload of `size` bytes.
#[must_use]
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Topic names `/topic0`, `/topic1`, ...
#[must_use]
pub fn topic_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("/topic{i}")).collect()
}

/// Inserts `count` messages spread round-robin over `topics`, one second apart.
///
/// # Errors
///
/// Propagates insert errors.
pub fn fill(log: &Log, topics: &[String], count: usize, payload_size: usize) -> LogResult<()> {
    let data = random_data(payload_size);
    for i in 0..count {
        let topic = &topics[i % topics.len()];
        log.insert_message(Timestamp::new(i as i64, 0), topic, "bench.Bytes", &data)?;
    }
    Ok(())
}
