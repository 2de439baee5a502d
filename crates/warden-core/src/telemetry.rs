//! Tracing subscriber installation

use crate::config::LoggingConfig;
use crate::{Result, WardenError};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber described by `config`.
///
/// Returns `Ok(false)` when a global subscriber was already installed, so
/// repeated calls from tests and embedding services are harmless.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| WardenError::config(format!("invalid log filter '{}': {e}", config.filter)))?;

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    };

    Ok(installed)
}
