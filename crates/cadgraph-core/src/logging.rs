#![forbid(unsafe_code)]

//! Production logging setup.
//!
//! The library only emits `tracing` events. Binaries that want JSON lines
//! on stderr enable the `tracing-json` feature and call [`init_json`] once
//! at startup. The level comes from `RUST_LOG` (default `info`).

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install a global JSON subscriber.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_json() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_current_span(true)
        .try_init()
        .is_ok()
}

