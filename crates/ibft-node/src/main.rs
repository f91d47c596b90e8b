//! # IBFT Node
//!
//! Runs an in-process devnet until the target height or Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logging, node metrics)
//! 2. Load the devnet configuration from the environment
//! 3. Start every validator and its block producer
//! 4. Wait for the target height or an interrupt
//! 5. Shut down and report each validator's head

use anyhow::{Context, Result};
use ibft_node::{Devnet, NodeConfig};
use ibft_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry_config = TelemetryConfig::from_env();
    let metrics_enabled = telemetry_config.metrics_enabled;
    let _telemetry = init_telemetry(telemetry_config).context("Failed to initialize telemetry")?;

    let config = NodeConfig::from_env().context("Invalid devnet configuration")?;
    info!("===========================================");
    info!("  IBFT Devnet v{}", env!("CARGO_PKG_VERSION"));
    info!("  Validators: {}", config.validators);
    info!("  Target height: {}", config.target_height);
    info!("===========================================");

    let devnet = Devnet::launch(&config).context("Failed to launch devnet")?;

    tokio::select! {
        reached = devnet.wait_for_height(config.target_height) => {
            reached.context("Devnet stopped early")?;
        }
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.context("Failed to listen for Ctrl+C")?;
            warn!("Interrupted, stopping devnet");
        }
    }

    let reports = devnet.shutdown().await;
    for report in &reports {
        info!(
            validator = %hex::encode(report.address),
            height = report.height,
            head = %hex::encode(&report.head_hash[..8]),
            rounds_changed = report.stats.rounds_changed,
            dropped = report.stats.messages_dropped,
            "Validator report"
        );
    }

    if metrics_enabled {
        let text = encode_metrics().context("Failed to encode metrics")?;
        println!("{text}");
    }
    Ok(())
}
