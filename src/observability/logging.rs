//! # Logging
//!
//! Tracing subscriber setup. `RUST_LOG` wins over the configured level when set.

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `format` is `json` or `text`; `level` is used when `RUST_LOG` is not set.
///
/// # Errors
/// Returns an error for an unknown format or when a subscriber is already installed
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("vault_bootstrap={}", level.to_lowercase())));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format.to_lowercase().as_str() {
        "json" => builder
            .json()
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}")),
        "text" => builder
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {e}")),
        other => Err(anyhow!("unsupported log format '{other}', only 'json' or 'text'")),
    }
}
