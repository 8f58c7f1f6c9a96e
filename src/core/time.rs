//! Timestamps and clocks.
//!
//! Command rows carry `enqueued_at` and `last_updated` timestamps and push
//! credentials carry a write-time stale token. All of them come from a
//! [`Clock`] injected at construction so tests can control ordering.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Milliseconds since the UNIX epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub ms: u64,
}

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(ms: u64) -> Self {
        Self { ms }
    }

    /// The epoch.
    pub const fn zero() -> Self {
        Self { ms: 0 }
    }

    /// Add milliseconds to this timestamp.
    pub const fn add_ms(self, ms: u64) -> Self {
        Self { ms: self.ms + ms }
    }

    /// Value stored in an `N` attribute.
    pub fn as_i64(self) -> i64 {
        i64::try_from(self.ms).unwrap_or(i64::MAX)
    }

    /// Read back a value stored with [`Timestamp::as_i64`].
    pub fn from_i64(ms: i64) -> Self {
        Self {
            ms: u64::try_from(ms).unwrap_or(0),
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match chrono::DateTime::from_timestamp_millis(self.as_i64()) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            None => write!(f, "{}ms", self.ms),
        }
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Timestamp::from_millis(ms)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a manual clock starting at the given time.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    /// Advance the current time.
    pub fn advance_ms(&self, ms: u64) {
        let mut now = self.now.lock();
        *now = now.add_ms(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
