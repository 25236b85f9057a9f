// File: holibot-core/src/test_utils/clock.rs

use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::utils::time::Clock;

/// A clock that only moves when told to. Wall-clock and monotonic time
/// advance together; moving the wall clock backwards leaves the monotonic
/// side where it is.
pub struct ManualClock {
    base: Instant,
    state: Mutex<(DateTime<Utc>, StdDuration)>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            base: Instant::now(),
            state: Mutex::new((start, StdDuration::ZERO)),
        }
    }

    /// Panics on a malformed RFC 3339 timestamp; meant for test fixtures.
    pub fn at(rfc3339: &str) -> Self {
        let start = DateTime::parse_from_rfc3339(rfc3339)
            .unwrap_or_else(|e| panic!("bad fixture timestamp {rfc3339}: {e}"))
            .with_timezone(&Utc);
        Self::new(start)
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut state = self.state.lock();
        if let Ok(forward) = (to - state.0).to_std() {
            state.1 += forward;
        }
        state.0 = to;
    }

    pub fn advance(&self, by: Duration) {
        let to = self.state.lock().0 + by;
        self.set(to);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().0
    }

    fn instant(&self) -> Instant {
        self.base + self.state.lock().1
    }
}
