//! Tracing subscriber installation.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::TelemetryConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter when set. Calling this more
/// than once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(config: &TelemetryConfig) {
    let filter_directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| config.log_filter.clone());

    let filter = match EnvFilter::try_new(&filter_directive) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("invalid log filter '{}': {}; using 'info'", filter_directive, e);
            EnvFilter::new("info")
        }
    };

    let builder = fmt().with_env_filter(filter).with_target(true);
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
