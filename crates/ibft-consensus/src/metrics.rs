//! # Consensus Metrics
//!
//! Prometheus metrics for monitoring the consensus core.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! ibft-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `ibft_core_round_total` - Round increments, catch-up included
//! - `ibft_core_current_round` - Round of the current view
//! - `ibft_core_sequence_total` - Sequence advances
//! - `ibft_core_hash_lock` - 1 while locked on a proposal
//! - `ibft_core_council_size` / `ibft_core_committee_size`
//! - `ibft_core_consensus_duration_seconds` - Preprepare to finality
//! - `ibft_vrank_*_commit_seconds` - Commit arrival summary per sequence

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_gauge, register_int_counter, register_int_gauge, Gauge, IntCounter, IntGauge};

use crate::domain::VrankReport;
use std::time::Duration;

#[cfg(feature = "metrics")]
lazy_static! {
    pub static ref ROUND_TOTAL: IntCounter = register_int_counter!(
        "ibft_core_round_total",
        "Total number of round increments"
    )
    .expect("Failed to create ROUND_TOTAL metric");

    pub static ref CURRENT_ROUND: IntGauge = register_int_gauge!(
        "ibft_core_current_round",
        "Round of the current view"
    )
    .expect("Failed to create CURRENT_ROUND metric");

    pub static ref SEQUENCE_TOTAL: IntCounter = register_int_counter!(
        "ibft_core_sequence_total",
        "Total number of sequence advances"
    )
    .expect("Failed to create SEQUENCE_TOTAL metric");

    pub static ref HASH_LOCK: IntGauge = register_int_gauge!(
        "ibft_core_hash_lock",
        "1 while the node is locked on a proposal"
    )
    .expect("Failed to create HASH_LOCK metric");

    pub static ref COUNCIL_SIZE: IntGauge = register_int_gauge!(
        "ibft_core_council_size",
        "Number of validators at the current sequence"
    )
    .expect("Failed to create COUNCIL_SIZE metric");

    pub static ref COMMITTEE_SIZE: IntGauge = register_int_gauge!(
        "ibft_core_committee_size",
        "Number of validators signing at the current sequence"
    )
    .expect("Failed to create COMMITTEE_SIZE metric");

    pub static ref CONSENSUS_DURATION: Gauge = register_gauge!(
        "ibft_core_consensus_duration_seconds",
        "Time from preprepare acceptance to finality"
    )
    .expect("Failed to create CONSENSUS_DURATION metric");

    pub static ref VRANK_FIRST_COMMIT: Gauge = register_gauge!(
        "ibft_vrank_first_commit_seconds",
        "Arrival of the first commit"
    )
    .expect("Failed to create VRANK_FIRST_COMMIT metric");

    pub static ref VRANK_QUORUM_COMMIT: Gauge = register_gauge!(
        "ibft_vrank_quorum_commit_seconds",
        "Arrival of the commit completing the quorum"
    )
    .expect("Failed to create VRANK_QUORUM_COMMIT metric");

    pub static ref VRANK_AVG_COMMIT: Gauge = register_gauge!(
        "ibft_vrank_avg_commit_within_quorum_seconds",
        "Mean commit arrival within the quorum"
    )
    .expect("Failed to create VRANK_AVG_COMMIT metric");

    pub static ref VRANK_LAST_COMMIT: Gauge = register_gauge!(
        "ibft_vrank_last_commit_seconds",
        "Latest late commit arrival"
    )
    .expect("Failed to create VRANK_LAST_COMMIT metric");
}

/// Record round increments
#[cfg(feature = "metrics")]
pub fn record_round_change(increase: u64) {
    ROUND_TOTAL.inc_by(increase);
}

#[cfg(feature = "metrics")]
pub fn record_current_round(round: u64) {
    CURRENT_ROUND.set(round as i64);
}

/// Record sequence advances
#[cfg(feature = "metrics")]
pub fn record_sequence_advance(increase: u64) {
    SEQUENCE_TOTAL.inc_by(increase);
}

#[cfg(feature = "metrics")]
pub fn record_hash_lock(locked: bool) {
    HASH_LOCK.set(i64::from(locked));
}

#[cfg(feature = "metrics")]
pub fn record_validator_sizes(council: usize, committee: usize) {
    COUNCIL_SIZE.set(council as i64);
    COMMITTEE_SIZE.set(committee as i64);
}

#[cfg(feature = "metrics")]
pub fn record_consensus_duration(duration: Duration) {
    CONSENSUS_DURATION.set(duration.as_secs_f64());
}

/// Zero values are skipped so an empty sequence keeps the last reading
#[cfg(feature = "metrics")]
pub fn record_vrank(report: &VrankReport) {
    let gauges = [
        (&*VRANK_FIRST_COMMIT, report.first_commit),
        (&*VRANK_QUORUM_COMMIT, report.quorum_commit),
        (&*VRANK_AVG_COMMIT, report.avg_commit_within_quorum),
        (&*VRANK_LAST_COMMIT, report.last_commit),
    ];
    for (gauge, value) in gauges {
        if !value.is_zero() {
            gauge.set(value.as_secs_f64());
        }
    }
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_round_change(_increase: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_current_round(_round: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_sequence_advance(_increase: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_hash_lock(_locked: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_validator_sizes(_council: usize, _committee: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_consensus_duration(_duration: Duration) {}

#[cfg(not(feature = "metrics"))]
pub fn record_vrank(_report: &VrankReport) {}
