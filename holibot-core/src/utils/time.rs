use std::time::Instant;

use chrono::{DateTime, Utc};

/// Source of time for the schedulers.
///
/// `now()` is wall-clock UTC and drives calendar math; `instant()` is
/// monotonic and drives debounce intervals.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn instant(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Converts a std duration into a chrono one, saturating on overflow.
pub fn to_chrono(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
