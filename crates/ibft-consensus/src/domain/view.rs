//! Views and core states

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `(sequence, round)` pair under negotiation.
///
/// Ordering is lexicographic: sequence first, then round.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct View {
    /// Block height under negotiation
    pub sequence: u64,
    /// Attempt counter at this height, reset on sequence advance
    pub round: u64,
}

impl View {
    pub fn new(sequence: u64, round: u64) -> Self {
        Self { sequence, round }
    }

    /// Same sequence, next round.
    pub fn next_round(&self) -> Self {
        Self {
            sequence: self.sequence,
            round: self.round.saturating_add(1),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.sequence, self.round)
    }
}

/// Phase of the current round.
///
/// Waiting for a round change is tracked separately by the core since it
/// overlays whichever phase the node was in when it gave up on the round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    AcceptRequest,
    Preprepared,
    Prepared,
    Committed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::AcceptRequest => "Accept request",
            State::Preprepared => "Preprepared",
            State::Prepared => "Prepared",
            State::Committed => "Committed",
        };
        f.write_str(name)
    }
}
