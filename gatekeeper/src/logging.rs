//! Development-time tracing.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The dispatch
//! journal under `.gatekeeper/tickets/<id>/journal/` is the product record
//! and is written regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber. Defaults to `warn` if `RUST_LOG` is unset.
///
/// ```bash
/// RUST_LOG=gatekeeper=debug gatekeeper run PROJ-12
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
