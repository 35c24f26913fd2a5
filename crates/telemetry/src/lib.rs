//! # flowgate-telemetry
//!
//! Structured logging setup plus a small sink abstraction for exporting
//! per-port counters (drops, marks, queue occupancy) without pulling in a
//! full metrics pipeline.
//!
//! Libraries stay subscriber-agnostic; only binaries call [`init_tracing`].

pub mod sink;

pub use sink::{LineSink, NullSink, PortSnapshot, TelemetrySink};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber with sensible defaults.
///
/// # Environment Variables
/// - `RUST_LOG`: filter directives (default: `"info"`), e.g.
///   `RUST_LOG=flowgate_scheduler=debug`
///
/// # Panics
/// Panics if a subscriber is already installed (call once per process).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true).with_thread_ids(false).compact())
        .init();
}

/// Same as [`init_tracing`] but with an explicit filter string, for
/// binaries that want a non-default level without requiring `RUST_LOG`.
pub fn init_tracing_with_filter(filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(fmt::layer().with_target(true).with_level(true).with_thread_ids(false).compact())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_filter_parses_without_panicking() {
        let _ = EnvFilter::new("debug,flowgate_scheduler=trace");
    }
}
