//! Logging setup.
//!
//! `RUST_LOG` takes precedence over the configured level.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Installs the global tracing subscriber.
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if settings.json_format {
        registry
            .with(fmt::layer().json().with_target(false).with_thread_names(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_thread_names(true))
            .try_init()
    };
    installed.map_err(|e| anyhow!("failed to install logger: {e}"))
}
