//! # IBFT Telemetry
//!
//! Observability plumbing for the devnet binary.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` with an env filter, text or JSON
//! - **Metrics**: node-level Prometheus collectors and text exposition of
//!   the default registry, which also carries the consensus collectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ibft_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IBFT_SERVICE_NAME` | `ibft-devnet` | Name attached to the startup log |
//! | `IBFT_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directives |
//! | `IBFT_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `IBFT_METRICS` | `true` | Register node metrics |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, record_block_finalized, register_metrics, BLOCKS_FINALIZED, CHAIN_HEIGHT,
    ROUNDS_CHANGED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and, when enabled, the node metrics.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    logging::init_logging(&config)?;
    if config.metrics_enabled {
        register_metrics()?;
    }

    tracing::info!(
        service = %config.service_name,
        json = config.json_logs,
        metrics = config.metrics_enabled,
        "Telemetry initialized"
    );
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Keeps telemetry alive for the lifetime of the binary
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
