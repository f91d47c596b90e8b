//! # Devnet
//!
//! Wires N validators together and drives block production.
//!
//! ## Shutdown Sequence
//!
//! 1. Signal the producers and the finality tracker to stop
//! 2. Send `Shutdown` to every core
//! 3. Collect each core's final statistics

use crate::config::NodeConfig;
use ibft_consensus::adapters::{LocalNetwork, MemoryBackend, Secp256k1Verifier, TokioTimers};
use ibft_consensus::{Block, ConsensusStats, Core, CoreEvent, Proposal};
use shared_crypto::{Address, CryptoError, Hash, Secp256k1KeyPair};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Devnet errors
#[derive(Debug, Error)]
pub enum DevnetError {
    #[error("Failed to derive validator key {index}: {source}")]
    KeyDerivation { index: u64, source: CryptoError },

    #[error("Validator {0} stopped before reaching the target height")]
    ValidatorStopped(String),
}

/// Final state of one validator
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub address: Address,
    pub height: u64,
    pub head_hash: Hash,
    pub stats: ConsensusStats,
}

struct DevnetNode {
    address: Address,
    backend: Arc<MemoryBackend>,
    events: mpsc::UnboundedSender<CoreEvent<Block>>,
    core: JoinHandle<ConsensusStats>,
    producer: JoinHandle<()>,
}

/// A running validator set
pub struct Devnet {
    network: Arc<LocalNetwork<Block>>,
    nodes: Vec<DevnetNode>,
    finality: Option<JoinHandle<u64>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Devnet {
    /// Start every validator and its block producer.
    ///
    /// Validator keys are derived from seeds `1..=N` so runs are repeatable.
    /// Must be called inside a tokio runtime.
    pub fn launch(config: &NodeConfig) -> Result<Self, DevnetError> {
        let keys = (1..=config.validators as u64)
            .map(|index| {
                Secp256k1KeyPair::from_seed(index)
                    .map_err(|source| DevnetError::KeyDerivation { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let addresses: Vec<Address> = keys.iter().map(|key| key.address()).collect();

        let network = Arc::new(LocalNetwork::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consensus_config = config.consensus_config();

        let mut nodes = Vec::with_capacity(keys.len());
        for key in keys {
            let address = key.address();
            let (events, inbox) = mpsc::unbounded_channel();
            network.register(address, events.clone());

            let backend = Arc::new(MemoryBackend::new(
                key,
                addresses.clone(),
                config.proposer_policy,
                config.sub_group_size,
                Arc::clone(&network),
                events.clone(),
            ));
            let core = Core::new(
                Arc::clone(&backend),
                Arc::new(Secp256k1Verifier),
                TokioTimers::new(events.clone()),
                consensus_config.clone(),
            );

            let core = tokio::spawn(core.run(inbox));
            let producer = tokio::spawn(produce_blocks(
                Arc::clone(&backend),
                events.clone(),
                config.block_period,
                shutdown_rx.clone(),
            ));

            info!(validator = %short(&address), "Validator started");
            nodes.push(DevnetNode {
                address,
                backend,
                events,
                core,
                producer,
            });
        }

        // Every ledger finalizes the same blocks; count them on one
        let finality = nodes.first().map(|node| {
            tokio::spawn(track_finality(
                node.backend.subscribe_head(),
                shutdown_rx.clone(),
            ))
        });

        info!(
            validators = nodes.len(),
            policy = ?config.proposer_policy,
            request_timeout_ms = config.request_timeout.as_millis() as u64,
            "Devnet running"
        );
        Ok(Self {
            network,
            nodes,
            finality,
            shutdown_tx,
        })
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.nodes.iter().map(|node| node.address).collect()
    }

    /// Ledger of the validator at `index`
    pub fn backend(&self, index: usize) -> Option<&Arc<MemoryBackend>> {
        self.nodes.get(index).map(|node| &node.backend)
    }

    pub fn network(&self) -> &Arc<LocalNetwork<Block>> {
        &self.network
    }

    /// Wait until every validator has finalized `height`.
    pub async fn wait_for_height(&self, height: u64) -> Result<(), DevnetError> {
        for node in &self.nodes {
            let mut head = node.backend.subscribe_head();
            while *head.borrow_and_update() < height {
                if head.changed().await.is_err() {
                    return Err(DevnetError::ValidatorStopped(short(&node.address)));
                }
            }
        }
        info!(height, "All validators reached target height");
        Ok(())
    }

    /// Stop producers and cores and report where each validator ended.
    pub async fn shutdown(self) -> Vec<NodeReport> {
        info!("Initiating devnet shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            debug!("No producer listening for shutdown");
        }
        for node in &self.nodes {
            if node.events.send(CoreEvent::Shutdown).is_err() {
                warn!(validator = %short(&node.address), "Core already stopped");
            }
        }

        if let Some(finality) = self.finality {
            match finality.await {
                Ok(blocks) => info!(blocks, "Finalized blocks recorded"),
                Err(e) => error!(error = %e, "Finality tracker failed"),
            }
        }

        let mut reports = Vec::with_capacity(self.nodes.len());
        for node in self.nodes {
            node.producer.abort();
            let stats = match node.core.await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(validator = %short(&node.address), error = %e, "Core task failed");
                    ConsensusStats::default()
                }
            };
            let head = node.backend.head();
            ibft_telemetry::ROUNDS_CHANGED.inc_by(stats.rounds_changed);
            reports.push(NodeReport {
                address: node.address,
                height: head.number(),
                head_hash: head.hash(),
                stats,
            });
        }

        info!(
            delivered = self.network.delivered(),
            relayed = self.network.relayed(),
            "Devnet stopped"
        );
        reports
    }
}

/// Submit a block on top of every new head.
async fn produce_blocks(
    backend: Arc<MemoryBackend>,
    events: mpsc::UnboundedSender<CoreEvent<Block>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut head = backend.subscribe_head();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => return,
        }

        let height = *head.borrow_and_update();
        match backend.build_block(height.to_be_bytes().to_vec()) {
            Ok(block) => {
                debug!(number = block.number(), "Submitting proposal");
                if events.send(CoreEvent::Request(block)).is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to seal proposal");
                return;
            }
        }

        tokio::select! {
            changed = head.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}

/// Record every height one ledger finalizes after this call, until shutdown.
///
/// The returned future yields how many blocks were recorded.
fn track_finality(
    mut head: watch::Receiver<u64>,
    mut shutdown: watch::Receiver<bool>,
) -> impl Future<Output = u64> {
    let start = *head.borrow_and_update();
    async move {
        let mut last = start;
        loop {
            tokio::select! {
                biased;
                changed = head.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let height = *head.borrow_and_update();
                    // Heads coalesce in the watch; fill in skipped heights
                    for number in last + 1..=height {
                        ibft_telemetry::record_block_finalized(number);
                    }
                    last = last.max(height);
                }
                _ = shutdown.changed() => break,
            }
        }
        last - start
    }
}

fn short(address: &Address) -> String {
    hex::encode(&address[..4])
}
