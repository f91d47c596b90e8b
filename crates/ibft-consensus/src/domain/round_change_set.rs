//! RoundChange votes per round at the current sequence

use super::error::{ConsensusError, ConsensusResult};
use super::message::ConsensusMessage;
use super::message_set::MessageSet;
use super::validator::ValidatorSet;
use super::view::View;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct RoundChangeSet {
    validators: ValidatorSet,
    sequence: u64,
    rounds: BTreeMap<u64, MessageSet>,
    per_sender_limit: usize,
}

impl RoundChangeSet {
    pub fn new(validators: ValidatorSet, sequence: u64, per_sender_limit: usize) -> Self {
        Self {
            validators,
            sequence,
            rounds: BTreeMap::new(),
            per_sender_limit: per_sender_limit.max(1),
        }
    }

    /// Record a RoundChange for `round`. Returns the new count for that round.
    ///
    /// A sender holds votes in at most `per_sender_limit` rounds at once.
    pub fn add(&mut self, round: u64, message: ConsensusMessage) -> ConsensusResult<usize> {
        let sender = message.sender;
        let held = self
            .rounds
            .iter()
            .filter(|(r, messages)| **r != round && messages.has(&sender))
            .count();
        if held >= self.per_sender_limit {
            return Err(ConsensusError::TooManyRoundChanges(sender));
        }

        let validators = &self.validators;
        let sequence = self.sequence;
        self.rounds
            .entry(round)
            .or_insert_with(|| MessageSet::new(View::new(sequence, round), validators.clone()))
            .add(message)
    }

    /// Drop rounds below `round` and rounds without votes.
    pub fn clear(&mut self, round: u64) {
        self.rounds
            .retain(|r, messages| *r >= round && !messages.is_empty());
    }

    /// Largest round with at least `min` votes
    pub fn max_round(&self, min: usize) -> Option<u64> {
        self.rounds
            .iter()
            .rev()
            .find(|(_, messages)| messages.size() >= min)
            .map(|(round, _)| *round)
    }

    pub fn size(&self, round: u64) -> usize {
        self.rounds.get(&round).map_or(0, MessageSet::size)
    }
}
