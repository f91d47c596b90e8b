//! In-memory ledger backend
//!
//! Holds a chain of `Block`s, a static validator set and the node key. Used
//! by the devnet binary and the integration tests.

use super::network::LocalNetwork;
use super::verifier::Secp256k1Verifier;
use crate::domain::{
    verify_committed_seals, Block, ProposerPolicy, Proposal, ValidatorSet,
};
use crate::events::CoreEvent;
use crate::ports::{Backend, BackendError, SignatureVerifier, VerifyError};
use parking_lot::RwLock;
use shared_crypto::{Address, CryptoError, Hash, RecoverableSignature, Secp256k1KeyPair};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc::UnboundedSender, watch};
use tracing::{debug, info, warn};

/// Ledger of one validator
pub struct MemoryBackend {
    keypair: Secp256k1KeyPair,
    address: Address,
    chain: RwLock<Vec<Block>>,
    validators: Vec<Address>,
    policy: ProposerPolicy,
    sub_size: usize,
    network: Arc<LocalNetwork<Block>>,
    events: UnboundedSender<CoreEvent<Block>>,
    bad_proposals: RwLock<HashSet<Hash>>,
    pending_failures: AtomicUsize,
    head: watch::Sender<u64>,
    verifier: Secp256k1Verifier,
}

impl MemoryBackend {
    /// Create a backend at genesis.
    ///
    /// `events` is this node's own queue; finality is announced on it.
    pub fn new(
        keypair: Secp256k1KeyPair,
        validators: Vec<Address>,
        policy: ProposerPolicy,
        sub_size: usize,
        network: Arc<LocalNetwork<Block>>,
        events: UnboundedSender<CoreEvent<Block>>,
    ) -> Self {
        let (head, _) = watch::channel(0);
        Self {
            address: keypair.address(),
            keypair,
            chain: RwLock::new(vec![Block::genesis()]),
            validators,
            policy,
            sub_size,
            network,
            events,
            bad_proposals: RwLock::new(HashSet::new()),
            pending_failures: AtomicUsize::new(0),
            head,
            verifier: Secp256k1Verifier,
        }
    }

    /// Append already finalized blocks without seal checks
    pub fn import_chain(&self, blocks: &[Block]) {
        let mut chain = self.chain.write();
        chain.extend(blocks.iter().cloned());
        self.head.send_replace(chain.len() as u64 - 1);
    }

    pub fn head(&self) -> Block {
        let chain = self.chain.read();
        chain[chain.len() - 1].clone()
    }

    pub fn height(&self) -> u64 {
        self.chain.read().len() as u64 - 1
    }

    pub fn chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    pub fn block(&self, number: u64) -> Option<Block> {
        self.chain.read().get(number as usize).cloned()
    }

    /// Reject the next `count` commits as a ledger fault would
    pub fn fail_next_commits(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn mark_bad(&self, hash: Hash) {
        self.bad_proposals.write().insert(hash);
    }

    /// Follow the chain height
    pub fn subscribe_head(&self) -> watch::Receiver<u64> {
        self.head.subscribe()
    }

    pub fn network(&self) -> &Arc<LocalNetwork<Block>> {
        &self.network
    }

    /// Sealed block on top of the current head
    pub fn build_block(&self, payload: Vec<u8>) -> Result<Block, CryptoError> {
        let parent = self.head();
        let timestamp = now_millis().max(parent.header.timestamp + 1);
        Block::child_of(&parent, self.address, timestamp, payload).sealed_by(&self.keypair)
    }

    fn validator_set(&self) -> ValidatorSet {
        ValidatorSet::new(self.validators.clone(), self.policy, self.sub_size)
    }
}

impl Backend for MemoryBackend {
    type Proposal = Block;

    fn address(&self) -> Address {
        self.address
    }

    fn last_proposal(&self) -> (Block, Option<Address>) {
        let head = self.head();
        let proposer = (!head.is_genesis()).then_some(head.header.proposer);
        (head, proposer)
    }

    fn validators(&self, _proposal: &Block) -> ValidatorSet {
        self.validator_set()
    }

    fn verify(&self, proposal: &Block) -> Result<(), VerifyError> {
        if self.has_bad_proposal(&proposal.hash()) {
            return Err(VerifyError::Invalid("known bad proposal".into()));
        }
        match proposal.seal_signer() {
            Some(signer) if signer == proposal.header.proposer => {}
            _ => return Err(VerifyError::Invalid("invalid proposer seal".into())),
        }
        if !self.validators.contains(&proposal.header.proposer) {
            return Err(VerifyError::Invalid("proposer is not a validator".into()));
        }
        let now = now_millis();
        if proposal.header.timestamp > now {
            return Err(VerifyError::FutureBlock(Duration::from_millis(
                proposal.header.timestamp - now,
            )));
        }
        Ok(())
    }

    fn sign(&self, data: &[u8]) -> Result<RecoverableSignature, BackendError> {
        self.keypair
            .sign_recoverable(data)
            .map_err(|err| BackendError::Signing(err.to_string()))
    }

    fn commit(&self, proposal: &Block, seals: Vec<RecoverableSignature>) -> Result<(), BackendError> {
        let pending = self.pending_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_failures.store(pending - 1, Ordering::SeqCst);
            warn!(number = proposal.number(), "Rejecting commit: state root mismatch");
            return Err(BackendError::Commit("state root mismatch".into()));
        }

        let hash = proposal.hash();
        verify_committed_seals(&hash, &seals, &self.validator_set(), |data, sig| {
            self.verifier.recover_signer(data, sig)
        })
        .map_err(|err| BackendError::Commit(err.to_string()))?;

        let number = {
            let mut chain = self.chain.write();
            let head = &chain[chain.len() - 1];
            if proposal.parent_hash() != head.hash() || proposal.number() != head.number() + 1 {
                return Err(BackendError::Commit(format!(
                    "block {} does not extend head {}",
                    proposal.number(),
                    head.number()
                )));
            }
            let mut block = proposal.clone();
            block.committed_seals = seals;
            chain.push(block);
            proposal.number()
        };

        info!(
            number,
            hash = %hex::encode(&hash[..8]),
            "Block finalized"
        );
        self.head.send_replace(number);
        if self.events.send(CoreEvent::FinalCommitted).is_err() {
            debug!("Core queue closed, finality not announced");
        }
        Ok(())
    }

    fn has_bad_proposal(&self, hash: &Hash) -> bool {
        self.bad_proposals.read().contains(hash)
    }

    fn broadcast(
        &self,
        _prev_hash: &Hash,
        validators: &ValidatorSet,
        payload: Vec<u8>,
    ) -> Result<(), BackendError> {
        self.network
            .send_to_peers(&self.address, validators.list(), &payload);
        Ok(())
    }

    fn gossip_sub_peer(&self, _prev_hash: &Hash, validators: &ValidatorSet, payload: &[u8]) {
        self.network.relay(&self.address, validators.list(), payload);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
