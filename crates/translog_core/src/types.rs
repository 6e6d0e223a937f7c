//! Core value types: timestamps, time ranges and topic patterns.

use crate::error::{LogError, LogResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Capture time of a message, as seconds and nanoseconds since the Unix epoch.
///
/// `nsec` is always below one second, so the derived ordering is the
/// chronological one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    sec: i64,
    nsec: u32,
}

impl Timestamp {
    /// The Unix epoch.
    pub const ZERO: Self = Self { sec: 0, nsec: 0 };

    /// Creates a timestamp, carrying whole seconds out of `nsec`.
    #[must_use]
    pub const fn new(sec: i64, nsec: u32) -> Self {
        Self {
            sec: sec + (nsec / NANOS_PER_SEC) as i64,
            nsec: nsec % NANOS_PER_SEC,
        }
    }

    /// Wall-clock time right now.
    #[must_use]
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Whole seconds.
    #[must_use]
    pub const fn sec(self) -> i64 {
        self.sec
    }

    /// Nanoseconds past [`Timestamp::sec`].
    #[must_use]
    pub const fn nsec(self) -> u32 {
        self.nsec
    }

    /// Total nanoseconds since the epoch.
    #[must_use]
    pub const fn as_nanos(self) -> i128 {
        self.sec as i128 * NANOS_PER_SEC as i128 + self.nsec as i128
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => after.into(),
            Err(before) => {
                let d = before.duration();
                let secs = d.as_secs() as i64;
                match d.subsec_nanos() {
                    0 => Self::new(-secs, 0),
                    n => Self::new(-secs - 1, NANOS_PER_SEC - n),
                }
            }
        }
    }
}

impl From<Duration> for Timestamp {
    fn from(since_epoch: Duration) -> Self {
        Self::new(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}

impl FromStr for Timestamp {
    type Err = LogError;

    /// Parses `"<sec>"` or `"<sec>.<fraction>"`, with at most nine fraction digits.
    fn from_str(s: &str) -> LogResult<Self> {
        let bad = || LogError::invalid_argument(format!("invalid timestamp: {s:?}"));
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        if frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let sec: i64 = whole.parse().map_err(|_| bad())?;
        let nsec: u32 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<9}").parse().map_err(|_| bad())?
        };

        Ok(match (negative, nsec) {
            (false, _) => Self::new(sec, nsec),
            (true, 0) => Self::new(-sec, 0),
            (true, n) => Self::new(-sec - 1, NANOS_PER_SEC - n),
        })
    }
}

/// A half-open window `[begin, end)` of capture times. Open ends are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub begin: Option<Timestamp>,
    /// Exclusive upper bound.
    pub end: Option<Timestamp>,
}

impl TimeRange {
    /// Every time.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            begin: None,
            end: None,
        }
    }

    /// Times at or after `begin`.
    #[must_use]
    pub const fn from(begin: Timestamp) -> Self {
        Self {
            begin: Some(begin),
            end: None,
        }
    }

    /// Times strictly before `end`.
    #[must_use]
    pub const fn until(end: Timestamp) -> Self {
        Self {
            begin: None,
            end: Some(end),
        }
    }

    /// Times in `[begin, end)`.
    #[must_use]
    pub const fn between(begin: Timestamp, end: Timestamp) -> Self {
        Self {
            begin: Some(begin),
            end: Some(end),
        }
    }

    /// Whether `time` falls inside the window.
    #[must_use]
    pub fn contains(&self, time: Timestamp) -> bool {
        self.begin.map_or(true, |b| time >= b) && self.end.map_or(true, |e| time < e)
    }

    /// Whether no time can satisfy the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!((self.begin, self.end), (Some(b), Some(e)) if b >= e)
    }
}

/// A regular expression that must match a whole topic name.
///
/// `".*foo.*"` selects `/foo1` but `"foo"` does not, unlike a plain substring
/// search.
#[derive(Debug, Clone)]
pub struct TopicPattern {
    source: String,
    anchored: Regex,
}

impl TopicPattern {
    /// Compiles `pattern` for full-string matching.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::InvalidArgument`] if the expression does not compile.
    pub fn new(pattern: &str) -> LogResult<Self> {
        let bad = |e: regex::Error| LogError::invalid_argument(format!("bad topic pattern: {e}"));
        // The bare expression must stand on its own, or `a)|(b` would escape the anchors.
        Regex::new(pattern).map_err(bad)?;
        let anchored = Regex::new(&format!("^(?:{pattern})$")).map_err(bad)?;
        Ok(Self {
            source: pattern.to_owned(),
            anchored,
        })
    }

    /// The expression as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the whole of `topic` matches.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.anchored.is_match(topic)
    }
}

impl PartialEq for TopicPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for TopicPattern {}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for TopicPattern {
    type Err = LogError;

    fn from_str(s: &str) -> LogResult<Self> {
        Self::new(s)
    }
}
