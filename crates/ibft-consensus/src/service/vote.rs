//! Prepare and Commit handling

use super::Core;
use crate::domain::{
    collect_committed_seals, ConsensusError, ConsensusMessage, ConsensusResult, MessageCode,
    State, Subject,
};
use crate::ports::{Backend, RoundTimers, SignatureVerifier};
use shared_crypto::Hash;
use tracing::{debug, warn};

enum Vote {
    Prepare,
    Commit,
}

impl<B, V, T> Core<B, V, T>
where
    B: Backend,
    V: SignatureVerifier,
    T: RoundTimers,
{
    pub(super) fn send_prepare(&mut self) {
        self.send_vote(Vote::Prepare);
    }

    pub(super) fn send_commit(&mut self) {
        self.send_vote(Vote::Commit);
    }

    fn send_vote(&mut self, vote: Vote) {
        let Some(subject) = self.current.as_ref().and_then(|current| current.subject().ok()) else {
            return;
        };
        // Validators outside the committee only listen
        if !self
            .validators
            .check_in_committee(&subject.prev_hash, &subject.view, &self.address)
        {
            return;
        }
        let body = match self.codec.encode_subject(&subject) {
            Ok(body) => body,
            Err(err) => {
                warn!(%err, "Failed to encode subject");
                return;
            }
        };
        match vote {
            Vote::Prepare => self.broadcast(MessageCode::Prepare, subject.prev_hash, body, None),
            Vote::Commit => self.broadcast(
                MessageCode::Commit,
                subject.prev_hash,
                body,
                Some(subject.digest),
            ),
        }
    }

    /// Decode and check a Prepare/Commit subject against the current round.
    fn check_vote(&self, code: MessageCode, message: &ConsensusMessage) -> ConsensusResult<Subject> {
        let subject = self.codec.decode_subject(&message.body)?;
        self.check_message(code, subject.view)?;

        let expected = self
            .current
            .as_ref()
            .ok_or(ConsensusError::NoPreprepare)?
            .subject()?;
        if subject != expected {
            warn!(
                from = %hex::encode(message.sender),
                %code,
                "Inconsistent subject"
            );
            return Err(ConsensusError::InconsistentSubject);
        }

        if !self
            .validators
            .check_in_committee(&message.prev_hash, &subject.view, &message.sender)
        {
            return Err(ConsensusError::NotInCommittee(message.sender));
        }
        Ok(subject)
    }

    pub(super) fn handle_prepare(&mut self, message: &ConsensusMessage) -> ConsensusResult<()> {
        let subject = self.check_vote(MessageCode::Prepare, message)?;
        self.current
            .as_mut()
            .ok_or(ConsensusError::NoPreprepare)?
            .add_prepare(message.clone())?;

        self.maybe_prepared(&subject.digest);
        Ok(())
    }

    pub(super) fn handle_commit(&mut self, message: &ConsensusMessage) -> ConsensusResult<()> {
        let subject = self.check_vote(MessageCode::Commit, message)?;
        let verifier = &self.verifier;
        message.verify_committed_seal(&subject.digest, |data, signature| {
            verifier.recover_signer(data, signature)
        })?;

        let commits = self
            .current
            .as_mut()
            .ok_or(ConsensusError::NoPreprepare)?
            .add_commit(message.clone())?;
        let now = self.time_source.now();
        if let Some(vrank) = self.vrank.as_mut() {
            vrank.add_commit(subject.view, message.sender, now);
        }

        // Enough commits finalize even without having seen the prepares
        if commits > 2 * self.validators.f() && self.state < State::Committed {
            self.lock_hash();
            return self.commit();
        }
        self.maybe_prepared(&subject.digest);
        Ok(())
    }

    /// Move to Prepared on a matching lock or on 2f+1 distinct voters.
    fn maybe_prepared(&mut self, digest: &Hash) {
        if self.state >= State::Prepared {
            return;
        }
        let Some(current) = self.current.as_ref() else {
            return;
        };
        let locked_match = self.is_hash_locked() && current.locked_hash().as_ref() == Some(digest);
        if locked_match || current.prepare_or_commit_size() > 2 * self.validators.f() {
            self.lock_hash();
            self.set_state(State::Prepared);
            self.send_commit();
        }
    }

    /// Hand the proposal and its seals to the ledger.
    fn commit(&mut self) -> ConsensusResult<()> {
        self.set_state(State::Committed);

        let (proposal, seals) = {
            let current = self.current.as_ref().ok_or(ConsensusError::NoPreprepare)?;
            let proposal = current.proposal().cloned().ok_or(ConsensusError::NoPreprepare)?;
            (proposal, collect_committed_seals(current.commits()))
        };

        debug!(view = %self.current_view(), seals = seals.len(), "Committing proposal");
        self.stats.commits += 1;
        if let Err(err) = self.backend.commit(&proposal, seals) {
            self.stats.commit_failures += 1;
            self.unlock_hash();
            self.send_next_round_change("commit failure");
            return Err(ConsensusError::LedgerCommit(err.to_string()));
        }
        Ok(())
    }
}
