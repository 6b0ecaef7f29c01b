//! Tracing setup for the CLI.
//!
//! Chain debug records go through [`crate::TracingSink`], so enabling debug
//! mode only shows something once a subscriber is installed here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` when `RUST_LOG` is unset or invalid.
///
/// # Example
/// ```bash
/// RUST_LOG=gitchain=debug gitchain status
/// ```
pub fn init(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
