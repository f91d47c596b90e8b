//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for the startup log
    pub service_name: String,

    /// Log filter (`info`, `ibft_consensus=debug,warn`, ...)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,

    /// Whether to register the node metrics
    pub metrics_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "ibft-devnet".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IBFT_SERVICE_NAME`: Service name (default: ibft-devnet)
    /// - `IBFT_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `IBFT_JSON_LOGS`: JSON logs (default: false in dev, true in containers)
    /// - `IBFT_METRICS`: Register node metrics (default: true)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("IBFT_SERVICE_NAME")
                .unwrap_or_else(|_| "ibft-devnet".to_string()),

            log_level: env::var("IBFT_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            json_logs: env::var("IBFT_JSON_LOGS")
                .map(|v| parse_flag(&v))
                .unwrap_or(is_container),

            metrics_enabled: env::var("IBFT_METRICS")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}
