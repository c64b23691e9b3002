#![forbid(unsafe_code)]

//! Flush scheduling.
//!
//! [`FlushScheduler`] decides when pending notifications go out. It never
//! reads a clock: every call carries `now`, which keeps it deterministic
//! under test.
//!
//! # Modes
//!
//! - **Debounce**: every event pushes the deadline to `now + window`, so a
//!   burst is flushed once it has been quiet for a full window.
//! - **Throttle**: an event outside an open window flushes immediately and
//!   opens a window. Events inside the window wait for its trailing edge.
//!
//! A zero window flushes on every event in both modes.

use web_time::{Duration, Instant};

/// How pending events are turned into flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleMode {
    #[default]
    Debounce,
    Throttle,
}

impl ScheduleMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debounce => "debounce",
            Self::Throttle => "throttle",
        }
    }

    /// Parse `debounce` / `throttle`, case-insensitive.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("debounce") {
            Some(Self::Debounce)
        } else if text.eq_ignore_ascii_case("throttle") {
            Some(Self::Throttle)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlushScheduler {
    mode: ScheduleMode,
    window: Duration,
    /// When the pending events become due.
    deadline: Option<Instant>,
    /// Start of the open throttle window.
    window_start: Option<Instant>,
}

impl FlushScheduler {
    #[must_use]
    pub fn new(mode: ScheduleMode, window: Duration) -> Self {
        Self {
            mode,
            window,
            deadline: None,
            window_start: None,
        }
    }

    /// Note an event at `now`. Returns `true` when it should be flushed
    /// right away.
    pub fn on_event(&mut self, now: Instant) -> bool {
        if self.window.is_zero() {
            self.deadline = None;
            return true;
        }
        match self.mode {
            ScheduleMode::Debounce => {
                self.deadline = Some(now + self.window);
                false
            }
            ScheduleMode::Throttle => match self.window_start {
                Some(start) if now.saturating_duration_since(start) < self.window => {
                    self.deadline = Some(start + self.window);
                    false
                }
                _ => {
                    self.window_start = Some(now);
                    self.deadline = None;
                    true
                }
            },
        }
    }

    /// Returns `true` once when the deadline has passed.
    ///
    /// In throttle mode a trailing flush opens the next window at the
    /// deadline.
    pub fn check_deadline(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                if self.mode == ScheduleMode::Throttle {
                    self.window_start = Some(deadline);
                }
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Drop the deadline after a forced flush. The throttle window stays
    /// open.
    pub fn clear_deadline(&mut self) {
        self.deadline = None;
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.window_start = None;
    }

    #[must_use]
    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(100);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn debounce_waits_for_quiet_window() {
        let t0 = Instant::now();
        let mut s = FlushScheduler::new(ScheduleMode::Debounce, WINDOW);
        assert!(!s.on_event(t0));
        assert!(!s.on_event(t0 + ms(80)));
        // the second event pushed the deadline out
        assert!(!s.check_deadline(t0 + ms(120)));
        assert!(s.check_deadline(t0 + ms(180)));
        assert!(!s.check_deadline(t0 + ms(400)));
        assert!(!s.is_pending());
    }

    #[test]
    fn throttle_leads_then_trails() {
        let t0 = Instant::now();
        let mut s = FlushScheduler::new(ScheduleMode::Throttle, WINDOW);
        assert!(s.on_event(t0));
        assert!(!s.on_event(t0 + ms(10)));
        assert!(!s.on_event(t0 + ms(90)));
        assert_eq!(s.deadline(), Some(t0 + WINDOW));
        assert!(!s.check_deadline(t0 + ms(99)));
        assert!(s.check_deadline(t0 + ms(100)));

        // the trailing flush opened a new window at t0 + 100
        assert!(!s.on_event(t0 + ms(150)));
        assert_eq!(s.deadline(), Some(t0 + ms(200)));
        assert!(s.on_event(t0 + ms(500)));
    }

    #[test]
    fn zero_window_flushes_every_event() {
        let t0 = Instant::now();
        for mode in [ScheduleMode::Debounce, ScheduleMode::Throttle] {
            let mut s = FlushScheduler::new(mode, Duration::ZERO);
            assert!(s.on_event(t0));
            assert!(s.on_event(t0));
            assert!(!s.is_pending());
        }
    }

    #[test]
    fn reset_closes_the_throttle_window() {
        let t0 = Instant::now();
        let mut s = FlushScheduler::new(ScheduleMode::Throttle, WINDOW);
        assert!(s.on_event(t0));
        s.reset();
        assert!(s.on_event(t0 + ms(1)));
    }

    #[test]
    fn mode_parse_is_case_insensitive() {
        assert_eq!(ScheduleMode::parse(" Throttle "), Some(ScheduleMode::Throttle));
        assert_eq!(ScheduleMode::parse("DEBOUNCE"), Some(ScheduleMode::Debounce));
        assert_eq!(ScheduleMode::parse("burst"), None);
    }
}
