//! Consensus configuration

use super::validator::ProposerPolicy;
use std::time::Duration;

/// Default committee size when the validator set is larger
pub const DEFAULT_SUB_GROUP_SIZE: usize = 21;

/// Consensus configuration
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Base round-change timeout; round `r` waits `base + 2^r` seconds
    pub request_timeout: Duration,
    /// How the proposer rotates between rounds and heights
    pub proposer_policy: ProposerPolicy,
    /// Committee size for large validator sets
    pub sub_group_size: usize,
    /// Upper bound of the early/late split used by vrank
    pub vrank_threshold: Duration,
    /// Largest accepted wire message (bytes)
    pub max_message_size: u64,
    /// Backlog capacity per sender
    pub max_backlog_per_sender: usize,
    /// Rounds of the current sequence one sender may hold RoundChange votes in
    pub max_round_changes_per_sender: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            proposer_policy: ProposerPolicy::RoundRobin,
            sub_group_size: DEFAULT_SUB_GROUP_SIZE,
            vrank_threshold: Duration::from_millis(300),
            max_message_size: 10 * 1024 * 1024, // 10 MiB
            max_backlog_per_sender: 1024,
            max_round_changes_per_sender: 64,
        }
    }
}

impl ConsensusConfig {
    /// Round-change timeout for `round`.
    ///
    /// The exponential part saturates instead of overflowing.
    pub fn round_timeout(&self, round: u64) -> Duration {
        let exponent = u32::try_from(round).unwrap_or(u32::MAX);
        let backoff = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
        self.request_timeout
            .saturating_add(Duration::from_secs(backoff))
    }
}
