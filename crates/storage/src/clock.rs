//! Wall-clock abstraction.
//!
//! Freshness windows (registry snapshots, cache entries, TTL'd backend keys)
//! are all evaluated against a [`Clock`] so tests can move time forward
//! without sleeping.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared handle to the system clock.
#[must_use]
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Manually advanced clock for deterministic tests.
///
/// Clones share the same underlying time, so a test can hand one clone to
/// the component under test and advance another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { millis: Arc::new(AtomicI64::new(start.timestamp_millis())) }
    }

    /// Creates a clock frozen at the given Unix timestamp (seconds).
    #[must_use]
    pub fn at_unix(secs: i64) -> Self {
        Self { millis: Arc::new(AtomicI64::new(secs.saturating_mul(1000))) }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(millis, Ordering::AcqRel);
    }

    /// Jumps to an absolute time, forwards or backwards.
    pub fn set(&self, to: DateTime<Utc>) {
        self.millis.store(to.timestamp_millis(), Ordering::Release);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
    }
}
