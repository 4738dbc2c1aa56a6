//! Wall-clock access, injectable so queries and artifact ids are testable.

use chrono::{DateTime, TimeZone, Utc};

/// Source of "now" for window lower bounds and artifact ids.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current POSIX time in whole seconds.
    fn now_secs(&self) -> i64 {
        self.now().timestamp()
    }

    /// Current POSIX time in microseconds.
    fn now_micros(&self) -> i64 {
        self.now().timestamp_micros()
    }
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Frozen at `secs` POSIX seconds (clamped to the epoch if out of range).
    pub fn at_secs(secs: i64) -> Self {
        let at = Utc
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self(at)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
