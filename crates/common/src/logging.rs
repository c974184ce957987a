//! Logging and tracing initialization.
//!
//! The frame loop runs at up to 120Hz, so per-frame events are emitted at
//! `trace` level and the default filter keeps them out.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Build the env filter: `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter = build_filter(&config.level);

    if config.json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber).is_ok()
    }
}

/// Route logs through the test harness' captured output.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(build_filter("debug"))
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
