#![forbid(unsafe_code)]

//! Notification service configuration.

use web_time::Duration;

use crate::schedule::ScheduleMode;

/// Default flush window in milliseconds.
pub const DEFAULT_SCHEDULE_WINDOW_MS: u64 = 60;

/// Minimum allowed flush window. Zero flushes on every event.
pub const MIN_SCHEDULE_WINDOW_MS: u64 = 0;

/// Maximum allowed flush window.
pub const MAX_SCHEDULE_WINDOW_MS: u64 = 5_000;

/// Configuration for [`crate::NotificationService`].
///
/// # Defaults
///
/// | Setting | Default | Range | Description |
/// |---------|---------|-------|-------------|
/// | `schedule_mode` | debounce | debounce, throttle | When pending events are flushed |
/// | `schedule_window` | 60ms | 0-5000ms | Debounce quiet period or throttle window |
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `CADGRAPH_NOTIFY_MODE` | `debounce`/`throttle` | debounce | Schedule mode |
/// | `CADGRAPH_NOTIFY_WINDOW_MS` | u64 | 60 | Schedule window |
/// | `CADGRAPH_NOTIFY_SELECTION` | bool | true | Emit `selectionChanged` |
/// | `CADGRAPH_NOTIFY_NODES` | bool | true | Emit `nodeChanged` |
/// | `CADGRAPH_NOTIFY_PROPERTIES` | bool | true | Emit `propertyChanged` |
///
/// # Example
///
/// ```bash
/// # Send at most one message every 200ms
/// export CADGRAPH_NOTIFY_MODE=throttle
/// export CADGRAPH_NOTIFY_WINDOW_MS=200
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub schedule_mode: ScheduleMode,

    /// Default: 60ms.
    pub schedule_window: Duration,

    pub emit_selection_changed: bool,
    pub emit_node_changed: bool,

    /// When false no property handlers are attached to nodes at all.
    pub emit_property_changed: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            schedule_mode: ScheduleMode::default(),
            schedule_window: Duration::from_millis(DEFAULT_SCHEDULE_WINDOW_MS),
            emit_selection_changed: true,
            emit_node_changed: true,
            emit_property_changed: true,
        }
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    let val = val.trim();
    if val == "1" || val.eq_ignore_ascii_case("true") {
        Some(true)
    } else if val == "0" || val.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl NotificationConfig {
    #[must_use]
    pub fn with_mode(mut self, mode: ScheduleMode) -> Self {
        self.schedule_mode = mode;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.schedule_window = window;
        self
    }

    #[must_use]
    pub fn with_selection_changed(mut self, emit: bool) -> Self {
        self.emit_selection_changed = emit;
        self
    }

    #[must_use]
    pub fn with_node_changed(mut self, emit: bool) -> Self {
        self.emit_node_changed = emit;
        self
    }

    #[must_use]
    pub fn with_property_changed(mut self, emit: bool) -> Self {
        self.emit_property_changed = emit;
        self
    }

    /// Load config from environment variables.
    ///
    /// Values are clamped to valid ranges; unparsable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`NotificationConfig::from_env`], reading through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("CADGRAPH_NOTIFY_MODE")
            && let Some(mode) = ScheduleMode::parse(&val)
        {
            config.schedule_mode = mode;
        }

        if let Some(val) = lookup("CADGRAPH_NOTIFY_WINDOW_MS")
            && let Ok(ms) = val.trim().parse::<u64>()
        {
            config.schedule_window = Duration::from_millis(ms);
        }

        if let Some(flag) = lookup("CADGRAPH_NOTIFY_SELECTION").as_deref().and_then(parse_flag) {
            config.emit_selection_changed = flag;
        }
        if let Some(flag) = lookup("CADGRAPH_NOTIFY_NODES").as_deref().and_then(parse_flag) {
            config.emit_node_changed = flag;
        }
        if let Some(flag) = lookup("CADGRAPH_NOTIFY_PROPERTIES").as_deref().and_then(parse_flag) {
            config.emit_property_changed = flag;
        }

        config.validated()
    }

    /// Clamp `schedule_window` to 0-5000ms.
    #[must_use]
    pub fn validated(mut self) -> Self {
        let window_ms = self.schedule_window.as_millis() as u64;
        self.schedule_window =
            Duration::from_millis(window_ms.clamp(MIN_SCHEDULE_WINDOW_MS, MAX_SCHEDULE_WINDOW_MS));
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        let window_ms = self.schedule_window.as_millis() as u64;
        (MIN_SCHEDULE_WINDOW_MS..=MAX_SCHEDULE_WINDOW_MS).contains(&window_ms)
    }
}
