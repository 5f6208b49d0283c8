//! Clock port: monotonic time for measuring calculation spans, wall time for
//! persisted timestamps. Tests may substitute a fixed wall clock.

use std::time::Instant;

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    /// Monotonic instant for duration measurement.
    fn now(&self) -> Instant;

    /// Wall-clock time for `created_at`-style fields.
    fn wall(&self) -> DateTime<Utc>;
}

/// Production clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
