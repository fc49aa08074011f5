//! Source of the current time used to timestamp published events.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Provides the current time.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current time, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// [Clock] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [Clock] always returning the same instant, useful in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
