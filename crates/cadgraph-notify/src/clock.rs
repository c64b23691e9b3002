#![forbid(unsafe_code)]

//! Time sources for the notification service.
//!
//! The scheduler only ever compares [`Instant`]s it is handed. Message
//! timestamps are wall-clock milliseconds since the Unix epoch.

use std::cell::Cell;

use web_time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock {
    /// Monotonic time used for scheduling.
    fn now(&self) -> Instant;

    /// Milliseconds since the Unix epoch, stamped on outgoing messages.
    fn timestamp_ms(&self) -> u64;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn timestamp_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    origin_ms: u64,
    elapsed: Cell<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ManualClock {
    /// Start at `origin_ms` milliseconds since the epoch.
    #[must_use]
    pub fn new(origin_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            origin_ms,
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn timestamp_ms(&self) -> u64 {
        self.origin_ms + self.elapsed.get().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::new(1_000);
        let start = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now().duration_since(start), Duration::from_millis(250));
        assert_eq!(clock.timestamp_ms(), 1_250);
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.timestamp_ms() > 0);
    }
}
