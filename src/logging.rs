//! Tracing subscriber setup for the CLI.
//!
//! Library code only emits `tracing` events; the binary installs the
//! subscriber once at startup. Output goes to stderr so generated text on
//! stdout stays clean for piping.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter used when neither `RUST_LOG` nor `[logging] filter` is set.
pub const DEFAULT_FILTER: &str = "info,llm_suite=debug";

/// Build the env filter: `RUST_LOG`, then the configured filter, then
/// [`DEFAULT_FILTER`].
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = build_filter(config);

    let result = if config.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(format = %config.format, "tracing initialized");
    }
}
