//! Chirps: counted messages published round-robin over a set of topics.
//!
//! Chirp `n` is published on every topic before chirp `n + 1`, so the `k`-th
//! message recorded from `t` topics carries the value `k / t + 1`.

use std::thread::{self, JoinHandle};
use std::time::Duration;
use translog_core::{LocalNode, NodeResult, Publisher};

/// Type name attached to every chirp.
pub const CHIRP_TYPE: &str = "translog.test.Int32";

/// Encodes a chirp value.
#[must_use]
pub fn encode_chirp(value: i32) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Decodes a chirp payload, if it is one.
#[must_use]
pub fn decode_chirp(data: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = data.try_into().ok()?;
    Some(i32::from_le_bytes(bytes))
}

/// Pacing of a chirp run.
#[derive(Debug, Clone, Copy)]
pub struct ChirpParams {
    /// Pause between advertising and the first chirp.
    pub delay_before_publishing: Duration,
    /// Pause between consecutive chirps.
    pub delay_between_chirps: Duration,
}

impl Default for ChirpParams {
    fn default() -> Self {
        Self {
            delay_before_publishing: Duration::from_millis(10),
            delay_between_chirps: Duration::from_millis(1),
        }
    }
}

impl ChirpParams {
    /// No pauses at all.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            delay_before_publishing: Duration::ZERO,
            delay_between_chirps: Duration::ZERO,
        }
    }
}

/// Publishers for a fixed set of topics, all of type [`CHIRP_TYPE`].
#[derive(Debug, Clone)]
pub struct Chirper {
    publishers: Vec<Publisher>,
}

impl Chirper {
    /// Advertises every topic.
    ///
    /// # Errors
    ///
    /// Fails if the node refuses a topic name.
    pub fn new(node: &LocalNode, topics: &[&str]) -> NodeResult<Self> {
        let publishers = topics
            .iter()
            .map(|topic| node.advertise(topic, CHIRP_TYPE))
            .collect::<NodeResult<_>>()?;
        Ok(Self { publishers })
    }

    /// Publishes `value` once on every topic.
    pub fn chirp(&self, value: i32) {
        let payload = encode_chirp(value);
        for publisher in &self.publishers {
            publisher.publish(&payload);
        }
    }

    /// Chirps `first..=last`, pausing `delay` after each.
    pub fn chirp_range(&self, first: i32, last: i32, delay: Duration) {
        for value in first..=last {
            self.chirp(value);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }
}

/// Chirps `1..=count` over `topics` on a new thread.
///
/// The topics are advertised on that thread, then publishing starts after
/// [`ChirpParams::delay_before_publishing`]. Join the handle to wait for the
/// last chirp.
pub fn begin_chirps(
    node: &LocalNode,
    topics: &[&str],
    count: i32,
    params: ChirpParams,
) -> JoinHandle<NodeResult<()>> {
    let node = node.clone();
    let topics: Vec<String> = topics.iter().map(|t| (*t).to_owned()).collect();
    thread::spawn(move || {
        let names: Vec<&str> = topics.iter().map(String::as_str).collect();
        let chirper = Chirper::new(&node, &names)?;
        thread::sleep(params.delay_before_publishing);
        chirper.chirp_range(1, count, params.delay_between_chirps);
        Ok(())
    })
}
