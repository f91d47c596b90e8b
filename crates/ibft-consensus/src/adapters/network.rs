//! In-process transport between cores

use crate::domain::{MessageCodec, MessageCode};
use crate::events::CoreEvent;
use parking_lot::{Mutex, RwLock};
use shared_crypto::{keccak256, Address, Hash};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

const SEEN_CAPACITY: usize = 65_536;

/// Decides whether a message from `origin` with `code` reaches `to`
pub type DeliveryFilter = dyn Fn(&Address, &Address, MessageCode) -> bool + Send + Sync;

/// Full-mesh network of event queues.
///
/// Each peer receives a payload at most once, whether it came from the
/// original broadcast or from a relay. Filters are applied to the message's
/// original sender so relays cannot route around a partition.
pub struct LocalNetwork<P> {
    peers: RwLock<HashMap<Address, UnboundedSender<CoreEvent<P>>>>,
    filter: RwLock<Option<Arc<DeliveryFilter>>>,
    seen: Mutex<HashSet<(Address, Hash)>>,
    codec: MessageCodec,
    delivered: AtomicU64,
    relayed: AtomicU64,
}

impl<P> LocalNetwork<P> {
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            filter: RwLock::new(None),
            seen: Mutex::new(HashSet::new()),
            codec: MessageCodec::default(),
            delivered: AtomicU64::new(0),
            relayed: AtomicU64::new(0),
        }
    }

    pub fn register(&self, address: Address, events: UnboundedSender<CoreEvent<P>>) {
        self.peers.write().insert(address, events);
    }

    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&Address, &Address, MessageCode) -> bool + Send + Sync + 'static,
    {
        *self.filter.write() = Some(Arc::new(filter));
    }

    pub fn clear_filter(&self) {
        *self.filter.write() = None;
    }

    /// Deliver `payload` from `from` to every target except `from` itself.
    /// Returns how many peers received it.
    pub fn send_to_peers(&self, from: &Address, targets: &[Address], payload: &[u8]) -> usize {
        let sent = self.dispatch(from, targets, payload);
        self.delivered.fetch_add(sent as u64, Ordering::Relaxed);
        sent
    }

    /// Forward a handled message to peers that have not seen it yet
    pub fn relay(&self, from: &Address, targets: &[Address], payload: &[u8]) -> usize {
        let sent = self.dispatch(from, targets, payload);
        self.relayed.fetch_add(sent as u64, Ordering::Relaxed);
        sent
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::Relaxed)
    }

    fn dispatch(&self, from: &Address, targets: &[Address], payload: &[u8]) -> usize {
        let digest = keccak256(payload);
        let header = self
            .codec
            .decode(payload)
            .ok()
            .map(|message| (message.sender, message.code));
        let filter = self.filter.read().clone();
        let peers = self.peers.read();
        let mut seen = self.seen.lock();
        if seen.len() > SEEN_CAPACITY {
            seen.clear();
        }
        // The sender has seen its own payload
        seen.insert((*from, digest));

        let mut sent = 0;
        for target in targets.iter().filter(|target| *target != from) {
            if let (Some(filter), Some((origin, code))) = (&filter, header) {
                if !filter(&origin, target, code) {
                    trace!(to = %hex::encode(target), %code, "Message filtered");
                    continue;
                }
            }
            if !seen.insert((*target, digest)) {
                continue;
            }
            let Some(peer) = peers.get(target) else {
                continue;
            };
            if peer
                .send(CoreEvent::Message {
                    payload: payload.to_vec(),
                })
                .is_ok()
            {
                sent += 1;
            }
        }
        sent
    }
}

impl<P> Default for LocalNetwork<P> {
    fn default() -> Self {
        Self::new()
    }
}
