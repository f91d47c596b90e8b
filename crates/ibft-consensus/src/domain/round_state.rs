//! State of the round under negotiation

use super::block::Proposal;
use super::error::{ConsensusError, ConsensusResult};
use super::message::{ConsensusMessage, Preprepare, Subject};
use super::message_set::MessageSet;
use super::validator::ValidatorSet;
use super::view::View;
use shared_crypto::{Address, Hash};
use std::collections::HashSet;

/// Preprepare, votes and lock for one view.
///
/// Owned exclusively by the core. A round change rebuilds it but may carry the
/// lock, the locked preprepare and the pending request across.
#[derive(Debug)]
pub struct RoundState<P> {
    view: View,
    preprepare: Option<Preprepare<P>>,
    prepares: MessageSet,
    commits: MessageSet,
    locked_hash: Option<Hash>,
    pending_request: Option<P>,
}

impl<P: Proposal> RoundState<P> {
    pub fn new(
        view: View,
        validators: &ValidatorSet,
        locked_hash: Option<Hash>,
        preprepare: Option<Preprepare<P>>,
        pending_request: Option<P>,
    ) -> Self {
        Self {
            view,
            preprepare,
            prepares: MessageSet::new(view, validators.clone()),
            commits: MessageSet::new(view, validators.clone()),
            locked_hash,
            pending_request,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn sequence(&self) -> u64 {
        self.view.sequence
    }

    pub fn round(&self) -> u64 {
        self.view.round
    }

    pub fn preprepare(&self) -> Option<&Preprepare<P>> {
        self.preprepare.as_ref()
    }

    pub fn set_preprepare(&mut self, preprepare: Preprepare<P>) {
        self.preprepare = Some(preprepare);
    }

    pub fn proposal(&self) -> Option<&P> {
        self.preprepare.as_ref().map(|preprepare| &preprepare.proposal)
    }

    /// Subject every Prepare and Commit of this round must carry
    pub fn subject(&self) -> ConsensusResult<Subject> {
        let preprepare = self.preprepare.as_ref().ok_or(ConsensusError::NoPreprepare)?;
        Ok(Subject {
            view: self.view,
            digest: preprepare.proposal.hash(),
            prev_hash: preprepare.proposal.parent_hash(),
        })
    }

    pub fn add_prepare(&mut self, message: ConsensusMessage) -> ConsensusResult<usize> {
        self.prepares.add(message)
    }

    pub fn add_commit(&mut self, message: ConsensusMessage) -> ConsensusResult<usize> {
        self.commits.add(message)
    }

    pub fn prepares(&self) -> &MessageSet {
        &self.prepares
    }

    pub fn commits(&self) -> &MessageSet {
        &self.commits
    }

    /// Senders counted once across Prepare and Commit
    pub fn prepare_or_commit_size(&self) -> usize {
        let senders: HashSet<&Address> = self
            .prepares
            .senders()
            .chain(self.commits.senders())
            .collect();
        senders.len()
    }

    pub fn is_hash_locked(&self) -> bool {
        self.locked_hash.is_some()
    }

    pub fn locked_hash(&self) -> Option<Hash> {
        self.locked_hash
    }

    /// Lock on the current preprepare's digest.
    ///
    /// Locking the same digest twice is a no-op; locking a different digest
    /// while locked is refused.
    pub fn lock_hash(&mut self) -> ConsensusResult<()> {
        let Some(proposal) = self.proposal() else {
            return Ok(());
        };
        let digest = proposal.hash();
        match self.locked_hash {
            Some(locked) if locked != digest => Err(ConsensusError::HashLockConflict {
                locked,
                proposed: digest,
            }),
            _ => {
                self.locked_hash = Some(digest);
                Ok(())
            }
        }
    }

    pub fn unlock_hash(&mut self) {
        self.locked_hash = None;
    }

    pub fn pending_request(&self) -> Option<&P> {
        self.pending_request.as_ref()
    }

    pub fn set_pending_request(&mut self, request: P) {
        self.pending_request = Some(request);
    }

    /// Lock, preprepare and pending request, for rebuilding on a round change
    pub fn into_carry(self) -> (Option<Hash>, Option<Preprepare<P>>, Option<P>) {
        (self.locked_hash, self.preprepare, self.pending_request)
    }
}
