//! Consensus statistics snapshot

use super::vrank::VrankReport;
use std::time::Duration;

/// Counters and gauges kept by the core regardless of the metrics feature
#[derive(Clone, Debug, Default)]
pub struct ConsensusStats {
    /// Round increments, including catch-up
    pub rounds_changed: u64,
    /// Sequences started after a finalized block
    pub sequences_advanced: u64,
    pub current_round: u64,
    pub hash_locked: bool,
    pub council_size: usize,
    pub committee_size: usize,
    /// Preprepare acceptance to finality for the last sequence
    pub last_consensus_duration: Option<Duration>,
    pub last_vrank: Option<VrankReport>,
    /// Inbound payloads rejected by a handler
    pub messages_dropped: u64,
    pub messages_backlogged: u64,
    /// Proposals handed to the ledger
    pub commits: u64,
    pub commit_failures: u64,
}
