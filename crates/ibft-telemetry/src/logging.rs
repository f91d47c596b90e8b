//! Subscriber installation.
//!
//! JSON lines carry `timestamp`, `level`, `target` and the structured fields
//! of each event (`seq`, `round`, `from`, `code`, ...).

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// An already installed subscriber is kept and reported at debug level.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log filter {:?}: {e}", config.log_level)))?;

    let installed = if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if let Err(e) = installed {
        tracing::debug!(error = %e, "Subscriber already installed");
    }
    Ok(())
}
