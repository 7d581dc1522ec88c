//! Logging initialization with level and destination overrides.

use std::io;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the tracing subscriber. `RUST_LOG` overrides `default_level`;
/// when `log_file` is set, output is appended there instead of stderr.
pub fn init_logging(default_level: &str, log_file: Option<&str>) -> io::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    Ok(())
}
