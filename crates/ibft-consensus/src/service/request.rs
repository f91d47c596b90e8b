//! Local proposal requests

use super::Core;
use crate::domain::{ConsensusError, ConsensusResult, Proposal, State};
use crate::events::CoreEvent;
use crate::ports::{Backend, RoundTimers, SignatureVerifier};
use tracing::trace;

impl<B, V, T> Core<B, V, T>
where
    B: Backend,
    V: SignatureVerifier,
    T: RoundTimers,
{
    pub(super) fn handle_request(&mut self, proposal: B::Proposal) -> ConsensusResult<()> {
        let sequence = self.current_view().sequence;
        let number = proposal.number();
        if number < sequence {
            return Err(ConsensusError::OldMessage);
        }
        if number > sequence {
            trace!(number, sequence, "Store future request");
            self.pending_requests.insert(number, proposal);
            return Err(ConsensusError::FutureMessage);
        }

        if let Some(current) = self.current.as_mut() {
            current.set_pending_request(proposal.clone());
        }
        if self.state == State::AcceptRequest {
            self.send_preprepare(&proposal);
        }
        Ok(())
    }

    /// Queue the request for the current sequence, dropping older ones.
    pub(super) fn process_pending_requests(&mut self) {
        let sequence = self.current_view().sequence;
        self.pending_requests = self.pending_requests.split_off(&sequence);
        if let Some(request) = self.pending_requests.remove(&sequence) {
            trace!(sequence, "Replay pending request");
            self.queue.push_back(CoreEvent::Request(request));
        }
    }
}
