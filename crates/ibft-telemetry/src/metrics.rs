//! Prometheus metrics for the devnet node.
//!
//! Consensus collectors live in `ibft-consensus` (feature `metrics`) and
//! register themselves in the default registry; this module adds the node
//! level ones and renders everything.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, TextEncoder};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Blocks finalized across all local validators
    pub static ref BLOCKS_FINALIZED: IntCounter = IntCounter::new(
        "ibft_node_blocks_finalized_total",
        "Total number of blocks finalized by local validators"
    ).expect("metric creation failed");

    /// Highest chain height among local validators
    pub static ref CHAIN_HEIGHT: IntGauge = IntGauge::new(
        "ibft_node_chain_height",
        "Highest finalized block number"
    ).expect("metric creation failed");

    /// Round changes reported by local validators when they stop
    pub static ref ROUNDS_CHANGED: IntCounter = IntCounter::new(
        "ibft_node_rounds_changed_total",
        "Round changes reported by local validators"
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Register the node metrics with the default registry.
///
/// Repeated calls are no-ops.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BLOCKS_FINALIZED.clone()),
            Box::new(CHAIN_HEIGHT.clone()),
            Box::new(ROUNDS_CHANGED.clone()),
        ];
        for metric in metrics {
            if let Err(e) = prometheus::register(metric) {
                result = Err(TelemetryError::MetricsInit(e.to_string()));
                return;
            }
        }
    });
    result
}

/// Count a finalized block and raise the height gauge.
pub fn record_block_finalized(number: u64) {
    BLOCKS_FINALIZED.inc();
    let height = i64::try_from(number).unwrap_or(i64::MAX);
    if height > CHAIN_HEIGHT.get() {
        CHAIN_HEIGHT.set(height);
    }
}

/// Encode the default registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
