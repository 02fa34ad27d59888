//! Telemetry initialization.
//!
//! Controlled by `CADENZA_LOG`:
//! - unset → no-op (tracing disabled, zero overhead)
//! - `"stderr"` → JSON spans/events to stderr
//! - any other value → used as an `EnvFilter` directive with the compact
//!   formatter to stderr (e.g. `CADENZA_LOG=cadenza=debug`)
//!
//! `RUST_LOG`, when set, refines the filter in all non-noop modes.

use tracing_subscriber::EnvFilter;

/// Opaque guard — hold in `main()` until exit.
pub struct TelemetryGuard {
    _private: (),
}

/// Initialize telemetry based on `CADENZA_LOG`.
///
/// Returns a guard that must be held until the program exits.
#[must_use]
pub fn init() -> TelemetryGuard {
    match std::env::var("CADENZA_LOG").ok().as_deref() {
        None | Some("") => TelemetryGuard { _private: () },
        Some("stderr") => init_stderr_json(),
        Some(directive) => init_compact(directive),
    }
}

/// JSON spans/events to stderr.
fn init_stderr_json() -> TelemetryGuard {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    TelemetryGuard { _private: () }
}

/// Compact human-readable output to stderr, filtered by `directive`.
fn init_compact(directive: &str) -> TelemetryGuard {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    TelemetryGuard { _private: () }
}
