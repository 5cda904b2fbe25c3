//! Time as a first-class dependency.
//!
//! Every deadline in the pipeline is an absolute [`Timestamp`] compared
//! against `clock.now()`, so components take an `Arc<dyn Clock>` and tests
//! substitute a [`ManualClock`] they can advance at will.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A point in time, in milliseconds since the Unix epoch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Epoch milliseconds.
    #[must_use]
    pub const fn millis(&self) -> i64 {
        self.0
    }

    /// Milliseconds from `self` until `later`, zero if `later` is not later.
    #[must_use]
    pub fn until(&self, later: Timestamp) -> Duration {
        Duration::from_millis((later.0 - self.0).max(0) as u64)
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_millis() as i64)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match DateTime::<Utc>::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Monotonic-enough source of the current time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation used outside tests.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(Utc::now().timestamp_millis())
    }
}

/// Hand-driven clock for deterministic deadline tests.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    /// Creates a clock pinned at the given epoch milliseconds.
    #[must_use]
    pub fn starting_at(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }

    /// Pins the clock to an absolute time.
    pub fn set(&self, to: Timestamp) {
        self.0.store(to.millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_arithmetic() {
        let t = Timestamp::from_millis(1_000);
        assert_eq!(t + Duration::from_secs(2), Timestamp::from_millis(3_000));
        assert_eq!(t.until(Timestamp::from_millis(1_500)), Duration::from_millis(500));
        assert_eq!(t.until(Timestamp::from_millis(500)), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::starting_at(10);
        assert_eq!(clock.now(), Timestamp::from_millis(10));

        clock.advance(Duration::from_millis(90));
        assert_eq!(clock.now(), Timestamp::from_millis(100));

        clock.set(Timestamp::from_millis(42));
        assert_eq!(clock.now(), Timestamp::from_millis(42));
    }

    #[test]
    fn test_system_clock_is_sane() {
        // 2020-01-01 in epoch millis.
        assert!(SystemClock.now().millis() > 1_577_836_800_000);
    }
}
