//! # Cluster Harness
//!
//! N validators, each a `Core` over a `MemoryBackend`, connected by a
//! `LocalNetwork`. Nothing runs on its own: events sit in per-node inboxes
//! until the test pumps them, and round-change timers fire only when the
//! test says so.
//!
//! Every ledger starts from the same pre-chain of 10 blocks proposed by the
//! validator at index 0, so with round robin the proposer of `(11, r)` is
//! the validator at index `(1 + r) % N`.

use ibft_consensus::adapters::{LocalNetwork, MemoryBackend, RecordingTimers, Secp256k1Verifier};
use ibft_consensus::domain::{
    prepare_committed_seal, signing_payload, Preprepare, Subject,
};
use ibft_consensus::{
    Block, ConsensusConfig, ConsensusMessage, Core, CoreEvent, MessageCode, MessageCodec,
    Proposal, View,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_crypto::{Address, Hash, Secp256k1KeyPair};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Height of the shared pre-chain
pub const PRE_CHAIN_HEIGHT: u64 = 10;

/// Base round-change timeout used by every node
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on pumped events before a test is declared live-locked
const MAX_EVENTS: usize = 100_000;

pub type ClusterCore = Core<MemoryBackend, Secp256k1Verifier, RecordingTimers>;

/// One validator of the cluster
pub struct ClusterNode {
    pub address: Address,
    pub key: Secp256k1KeyPair,
    pub backend: Arc<MemoryBackend>,
    pub timers: RecordingTimers,
    pub core: ClusterCore,
    sender: UnboundedSender<CoreEvent<Block>>,
    inbox: UnboundedReceiver<CoreEvent<Block>>,
}

pub struct Cluster {
    pub nodes: Vec<ClusterNode>,
    pub network: Arc<LocalNetwork<Block>>,
    pub codec: MessageCodec,
}

impl Cluster {
    /// Start `size` validators, sorted by address, on top of the pre-chain.
    pub fn new(size: usize) -> Self {
        Self::with_config(
            size,
            ConsensusConfig {
                request_timeout: REQUEST_TIMEOUT,
                ..Default::default()
            },
        )
    }

    /// Like [`Cluster::new`], but only `sub_group_size` validators vote per view
    pub fn with_committee(size: usize, sub_group_size: usize) -> Self {
        Self::with_config(
            size,
            ConsensusConfig {
                request_timeout: REQUEST_TIMEOUT,
                sub_group_size,
                ..Default::default()
            },
        )
    }

    pub fn with_config(size: usize, config: ConsensusConfig) -> Self {
        let mut keys: Vec<Secp256k1KeyPair> = (1..=size as u64)
            .map(|seed| Secp256k1KeyPair::from_seed(seed).unwrap())
            .collect();
        keys.sort_by_key(|key| key.address());
        let addresses: Vec<Address> = keys.iter().map(|key| key.address()).collect();
        let pre_chain = create_pre_chain(&keys[0]);
        let network = Arc::new(LocalNetwork::new());

        let nodes = keys
            .into_iter()
            .map(|key| {
                let address = key.address();
                let (sender, inbox) = mpsc::unbounded_channel();
                network.register(address, sender.clone());

                let backend = Arc::new(MemoryBackend::new(
                    Secp256k1KeyPair::from_bytes(*key.to_bytes()).unwrap(),
                    addresses.clone(),
                    config.proposer_policy,
                    config.sub_group_size,
                    Arc::clone(&network),
                    sender.clone(),
                ));
                backend.import_chain(&pre_chain);

                let timers = RecordingTimers::new();
                let mut core = Core::new(
                    Arc::clone(&backend),
                    Arc::new(Secp256k1Verifier),
                    timers.clone(),
                    config.clone(),
                );
                core.start();

                ClusterNode {
                    address,
                    key,
                    backend,
                    timers,
                    core,
                    sender,
                    inbox,
                }
            })
            .collect();

        Self {
            nodes,
            network,
            codec: MessageCodec::default(),
        }
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.iter().map(|node| node.address).collect()
    }

    pub fn head(&self) -> Block {
        self.nodes[0].backend.head()
    }

    pub fn heights(&self) -> Vec<u64> {
        self.nodes.iter().map(|node| node.backend.height()).collect()
    }

    /// Index of the validator proposing `(sequence, round)` after the pre-chain
    pub fn proposer_index(&self, round: u64) -> usize {
        ((1 + round) % self.size() as u64) as usize
    }

    /// Sealed proposal by `index` on top of its head
    pub fn build_block(&self, index: usize, payload: &[u8]) -> Block {
        self.nodes[index].backend.build_block(payload.to_vec()).unwrap()
    }

    /// Hand a fresh proposal to `index`. Returns the proposal.
    pub fn request(&mut self, index: usize, payload: &[u8]) -> Block {
        let block = self.build_block(index, payload);
        self.nodes[index]
            .core
            .handle_event(CoreEvent::Request(block.clone()));
        block
    }

    /// Fire the armed round-change timer of `index`.
    ///
    /// Returns the view the timer announced, if one was armed.
    pub fn fire_round_change(&mut self, index: usize) -> Option<View> {
        let node = &mut self.nodes[index];
        let next_view = node.timers.fire_round_change()?;
        node.core.handle_event(CoreEvent::Timeout { next_view });
        Some(next_view)
    }

    /// Put a transport payload in `to`'s inbox, bypassing the network
    pub fn inject(&self, to: usize, payload: Vec<u8>) {
        self.nodes[to]
            .sender
            .send(CoreEvent::Message { payload })
            .unwrap();
    }

    /// Deliver every queued event, node by node, until all inboxes are empty.
    ///
    /// Returns how many events were handled.
    pub fn run_until_idle(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = false;
            for node in &mut self.nodes {
                while let Ok(event) = node.inbox.try_recv() {
                    node.core.handle_event(event);
                    handled += 1;
                    progressed = true;
                    assert!(handled < MAX_EVENTS, "cluster does not quiesce");
                }
            }
            if !progressed {
                return handled;
            }
        }
    }

    /// Drain only `index`'s inbox; the other nodes keep theirs untouched.
    pub fn pump(&mut self, index: usize) -> usize {
        let node = &mut self.nodes[index];
        let mut handled = 0;
        while let Ok(event) = node.inbox.try_recv() {
            node.core.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Like [`Cluster::run_until_idle`], but every step hands one event to a
    /// node picked at random, so deliveries interleave differently per seed.
    pub fn run_shuffled(&mut self, seed: u64) -> usize {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut handled = 0;
        let mut parked: Vec<Vec<CoreEvent<Block>>> = self.nodes.iter().map(|_| Vec::new()).collect();
        loop {
            for (node, parked) in self.nodes.iter_mut().zip(parked.iter_mut()) {
                while let Ok(event) = node.inbox.try_recv() {
                    parked.push(event);
                }
            }
            let ready: Vec<usize> = (0..self.nodes.len())
                .filter(|index| !parked[*index].is_empty())
                .collect();
            if ready.is_empty() {
                return handled;
            }
            let index = ready[rng.gen_range(0..ready.len())];
            // Per-sender order is kept, arrival order across senders is not
            let event = parked[index].remove(0);
            self.nodes[index].core.handle_event(event);
            handled += 1;
            assert!(handled < MAX_EVENTS, "cluster does not quiesce");
        }
    }

    // === MESSAGE CRAFTING ===

    /// Sign a message as validator `from`
    pub fn sign(
        &self,
        from: usize,
        code: MessageCode,
        prev_hash: Hash,
        body: Vec<u8>,
        seal_digest: Option<Hash>,
    ) -> Vec<u8> {
        let key = &self.nodes[from].key;
        let message = ConsensusMessage {
            code,
            prev_hash,
            signature: key
                .sign_recoverable(&signing_payload(code, &prev_hash, &body))
                .unwrap(),
            committed_seal: seal_digest
                .map(|digest| key.sign_recoverable(&prepare_committed_seal(&digest)).unwrap()),
            body,
            sender: key.address(),
        };
        self.codec.encode(&message).unwrap()
    }

    pub fn preprepare(&self, from: usize, view: View, block: &Block) -> Vec<u8> {
        let body = self
            .codec
            .encode_preprepare(&Preprepare {
                view,
                proposal: block.clone(),
            })
            .unwrap();
        self.sign(from, MessageCode::Preprepare, block.parent_hash(), body, None)
    }

    pub fn vote(&self, from: usize, code: MessageCode, view: View, block: &Block) -> Vec<u8> {
        let subject = Subject {
            view,
            digest: block.hash(),
            prev_hash: block.parent_hash(),
        };
        let body = self.codec.encode_subject(&subject).unwrap();
        let seal = (code == MessageCode::Commit).then(|| block.hash());
        self.sign(from, code, subject.prev_hash, body, seal)
    }

    pub fn round_change(&self, from: usize, view: View) -> Vec<u8> {
        let head = self.head().hash();
        let subject = Subject {
            view,
            digest: [0u8; 32],
            prev_hash: head,
        };
        let body = self.codec.encode_subject(&subject).unwrap();
        self.sign(from, MessageCode::RoundChange, head, body, None)
    }

    // === ASSERTIONS ===

    /// Every node finalized `number` with the same block; returns it.
    pub fn assert_agreement(&self, number: u64) -> Block {
        let block = self.nodes[0]
            .backend
            .block(number)
            .unwrap_or_else(|| panic!("node 0 has no block {number}"));
        for (index, node) in self.nodes.iter().enumerate() {
            let other = node
                .backend
                .block(number)
                .unwrap_or_else(|| panic!("node {index} has no block {number}"));
            assert_eq!(other.hash(), block.hash(), "node {index} diverged at {number}");
        }
        block
    }

    /// Indices of the validators voting at `view` on top of the current head
    pub fn committee(&self, view: View) -> Vec<usize> {
        let members = self.nodes[0]
            .core
            .validators()
            .sub_list(&self.head().hash(), &view);
        members
            .iter()
            .filter_map(|member| self.nodes.iter().position(|node| node.address == *member))
            .collect()
    }

    /// Signers of `block`'s committed seals, checked to be distinct members
    pub fn seal_signers(&self, block: &Block) -> Vec<Address> {
        let members = self.addresses();
        let digest = prepare_committed_seal(&block.hash());
        let mut signers: Vec<Address> = block
            .committed_seals
            .iter()
            .map(|seal| shared_crypto::recover_address(&digest, seal).unwrap())
            .collect();
        for signer in &signers {
            assert!(members.contains(signer), "seal from outsider");
        }
        let count = signers.len();
        signers.sort_unstable();
        signers.dedup();
        assert_eq!(signers.len(), count, "duplicate seal signer");
        signers
    }
}

/// Ten sealed blocks on top of genesis, all proposed by `proposer`
fn create_pre_chain(proposer: &Secp256k1KeyPair) -> Vec<Block> {
    let mut parent = Block::genesis();
    let mut blocks = Vec::new();
    for number in 1..=PRE_CHAIN_HEIGHT {
        let block = Block::child_of(&parent, proposer.address(), number, vec![number as u8])
            .sealed_by(proposer)
            .unwrap();
        parent = block.clone();
        blocks.push(block);
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibft_consensus::State;

    #[test]
    fn test_cluster_starts_on_pre_chain() {
        let cluster = Cluster::new(4);
        assert_eq!(cluster.heights(), vec![10; 4]);
        for node in &cluster.nodes {
            assert_eq!(node.core.current_view(), View::new(11, 0));
            assert_eq!(node.core.state(), State::AcceptRequest);
            assert_eq!(node.core.proposer(), Some(cluster.addresses()[1]));
        }
        let mut sorted = cluster.addresses();
        sorted.sort_unstable();
        assert_eq!(sorted, cluster.addresses());
    }

    #[test]
    fn test_idle_cluster_has_nothing_to_do() {
        let mut cluster = Cluster::new(4);
        assert_eq!(cluster.run_until_idle(), 0);
        assert_eq!(
            cluster.nodes[0].timers.armed_round_change(),
            Some((View::new(11, 1), REQUEST_TIMEOUT + Duration::from_secs(1)))
        );
    }
}
