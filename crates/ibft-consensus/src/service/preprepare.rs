//! Preprepare handling

use super::Core;
use crate::domain::{
    ConsensusError, ConsensusMessage, ConsensusResult, MessageCode, Preprepare, Proposal, State,
};
use crate::ports::{Backend, RoundTimers, SignatureVerifier, VerifyError};
use tracing::{debug, warn};

impl<B, V, T> Core<B, V, T>
where
    B: Backend,
    V: SignatureVerifier,
    T: RoundTimers,
{
    /// Put `proposal` forward if this node proposes at its sequence.
    pub(super) fn send_preprepare(&mut self, proposal: &B::Proposal) {
        let view = self.current_view();
        if view.sequence != proposal.number() || !self.is_proposer() {
            return;
        }
        let preprepare = Preprepare {
            view,
            proposal: proposal.clone(),
        };
        match self.codec.encode_preprepare(&preprepare) {
            Ok(body) => {
                debug!(%view, "Sending preprepare");
                self.broadcast(MessageCode::Preprepare, proposal.parent_hash(), body, None);
            }
            Err(err) => warn!(%view, %err, "Failed to encode preprepare"),
        }
    }

    pub(super) fn handle_preprepare(&mut self, message: &ConsensusMessage) -> ConsensusResult<()> {
        let preprepare: Preprepare<B::Proposal> = self.codec.decode_preprepare(&message.body)?;
        self.check_message(MessageCode::Preprepare, preprepare.view)?;

        if !self.validators.is_proposer(&message.sender) {
            return Err(ConsensusError::NotFromProposer(message.sender));
        }
        // A second preprepare in the same round is ignored, valid or not
        if self.state != State::AcceptRequest {
            return Err(ConsensusError::Ignored);
        }

        let (last, _) = self.backend.last_proposal();
        let expected = last.hash();
        let parent = preprepare.proposal.parent_hash();
        if parent != expected || message.prev_hash != expected {
            self.send_next_round_change("invalid parent");
            return Err(ConsensusError::InvalidParent {
                expected,
                actual: parent,
            });
        }
        if preprepare.proposal.number() != preprepare.view.sequence {
            self.send_next_round_change("invalid proposal number");
            return Err(ConsensusError::InvalidProposal(format!(
                "number {} proposed at sequence {}",
                preprepare.proposal.number(),
                preprepare.view.sequence
            )));
        }

        match self.backend.verify(&preprepare.proposal) {
            Ok(()) => {}
            Err(VerifyError::FutureBlock(delay)) => {
                self.timers.stop_future_preprepare();
                self.timers.start_future_preprepare(message.clone(), delay);
                return Err(ConsensusError::FutureProposal(delay));
            }
            Err(VerifyError::Invalid(reason)) => {
                self.send_next_round_change("invalid proposal");
                return Err(ConsensusError::InvalidProposal(reason));
            }
        }

        if let Some(locked) = self.locked_hash().filter(|_| self.is_hash_locked()) {
            let proposed = preprepare.proposal.hash();
            if locked != proposed {
                warn!(
                    locked = %hex::encode(locked),
                    proposed = %hex::encode(proposed),
                    "Preprepare conflicts with locked proposal"
                );
                self.send_next_round_change("locked on another proposal");
                return Ok(());
            }
        }

        self.accept_preprepare(preprepare);
        self.set_state(State::Preprepared);
        self.send_prepare();
        Ok(())
    }

    fn accept_preprepare(&mut self, preprepare: Preprepare<B::Proposal>) {
        self.consensus_started = Some(self.time_source.now());
        if let Some(current) = self.current.as_mut() {
            current.set_preprepare(preprepare);
        }
    }
}
