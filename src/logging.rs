//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr through `tracing`; stdout stays clean for the
//! interaction layer. `RUST_LOG` wins when set, otherwise the debug flag
//! picks between `info` and `debug` for this crate.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored.
pub fn init(debug: bool) {
    let default_directive = if debug {
        "taskwright=debug"
    } else {
        "taskwright=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
