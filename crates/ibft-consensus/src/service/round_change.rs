//! Round changes, catch-up and round timeouts

use super::Core;
use crate::domain::{ConsensusError, ConsensusMessage, ConsensusResult, MessageCode, Proposal, Subject, View};
use crate::metrics;
use crate::ports::{Backend, RoundTimers, SignatureVerifier};
use tracing::{debug, warn};

impl<B, V, T> Core<B, V, T>
where
    B: Backend,
    V: SignatureVerifier,
    T: RoundTimers,
{
    /// Votes needed to start a round, and to catch up to one
    fn round_change_thresholds(&self) -> (usize, usize) {
        let size = self.validators.size();
        if size < 4 {
            return (size, size.saturating_sub(1));
        }
        let f = self.validators.f();
        (2 * f + 1, f + 1)
    }

    pub(super) fn handle_round_change(&mut self, message: &ConsensusMessage) -> ConsensusResult<()> {
        let subject = self.codec.decode_subject(&message.body)?;
        self.check_message(MessageCode::RoundChange, subject.view)?;

        let current = self.current_view();
        let round = subject.view.round;
        let votes = self.round_change_set.add(round, message.clone())?;
        let (start, catch_up) = self.round_change_thresholds();
        debug!(
            from = %hex::encode(message.sender),
            round,
            votes,
            "Round change vote"
        );

        if votes == start && (self.waiting_for_round_change || current.round < round) {
            self.start_new_round(round);
            return Ok(());
        }
        if self.waiting_for_round_change && votes == catch_up && current.round < round {
            self.send_round_change(round);
            return Ok(());
        }
        if current.round < round {
            // Recorded; waiting for more votes
            return Err(ConsensusError::Ignored);
        }
        Ok(())
    }

    pub(super) fn handle_timeout(&mut self, next_view: View) -> ConsensusResult<()> {
        let current = self.current_view();
        if next_view != current.next_round() {
            return Err(ConsensusError::StaleTimeout);
        }

        if !self.waiting_for_round_change {
            let max_round = self.round_change_set.max_round(self.validators.f() + 1);
            if let Some(max_round) = max_round.filter(|max_round| *max_round > current.round) {
                self.send_round_change(max_round);
                return Ok(());
            }
        }

        let (last, _) = self.backend.last_proposal();
        if last.number() >= current.sequence {
            self.start_new_round(0);
        } else {
            self.send_round_change(next_view.round);
        }
        Ok(())
    }

    pub(super) fn send_next_round_change(&mut self, reason: &str) {
        let current = self.current_view();
        debug!(view = %current, reason, "Requesting next round");
        self.send_round_change(current.round.saturating_add(1));
    }

    /// Catch up to `round` and ask the validators to move there.
    pub(super) fn send_round_change(&mut self, round: u64) {
        let current = self.current_view();
        if current.round >= round {
            debug!(current_round = current.round, round, "Round change already reached");
            return;
        }
        self.catch_up_round(View::new(current.sequence, round));

        let (last, _) = self.backend.last_proposal();
        let subject = Subject {
            view: self.current_view(),
            digest: [0u8; 32],
            prev_hash: last.hash(),
        };
        match self.codec.encode_subject(&subject) {
            Ok(body) => self.broadcast(MessageCode::RoundChange, subject.prev_hash, body, None),
            Err(err) => warn!(%err, "Failed to encode round change"),
        }
    }

    fn catch_up_round(&mut self, view: View) {
        let current = self.current_view();
        if view.round > current.round {
            let increase = view.round - current.round;
            metrics::record_round_change(increase);
            self.stats.rounds_changed += increase;
        }
        self.waiting_for_round_change = true;
        self.update_round_state(view, true);
        self.round_change_set.clear(view.round);
        self.new_round_change_timer();

        warn!(old = %current, new = %view, "[RC] Catch up round");
    }
}
