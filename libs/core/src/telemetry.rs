//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events. The `annb` binary installs a
//! stderr subscriber once at startup; tests install a capturing one.
//!
//! ```no_run
//! annb_core::telemetry::init_subscriber_with_default("info").ok();
//! tracing::info!("Application started");
//! ```

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

fn filter_or(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a stderr subscriber filtered by `RUST_LOG`, or by
/// `default_directive` when `RUST_LOG` is unset or unparsable.
///
/// Fails if a global subscriber is already installed.
pub fn init_subscriber_with_default(
    default_directive: &str,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter_or(default_directive))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

/// Route events through the libtest output capture. Safe to call from every
/// test; only the first call installs anything.
pub fn init_test_subscriber() {
    let _ = fmt()
        .with_env_filter(filter_or("debug"))
        .with_test_writer()
        .try_init();
}
