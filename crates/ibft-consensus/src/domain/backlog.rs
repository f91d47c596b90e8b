//! Buffer for messages that arrived ahead of the core

use super::message::ConsensusMessage;
use super::view::View;
use shared_crypto::Address;
use std::collections::{BTreeMap, HashMap};

/// Classification of a parked message against the current core state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Handle now
    Ready,
    /// Keep parked
    Future,
    /// Superseded, drop
    Old,
}

type BacklogKey = (View, u8, u64);

/// Per-sender priority queues keyed by `(view, code priority, arrival)`.
#[derive(Debug)]
pub struct Backlog {
    queues: HashMap<Address, BTreeMap<BacklogKey, ConsensusMessage>>,
    next_seq: u64,
    per_sender_limit: usize,
}

impl Backlog {
    pub fn new(per_sender_limit: usize) -> Self {
        Self {
            queues: HashMap::new(),
            next_seq: 0,
            per_sender_limit: per_sender_limit.max(1),
        }
    }

    /// Park a message. Returns false when the sender's queue is full.
    pub fn push(&mut self, view: View, message: ConsensusMessage) -> bool {
        let queue = self.queues.entry(message.sender).or_default();
        if queue.len() >= self.per_sender_limit {
            return false;
        }
        let key = (view, message.code.priority(), self.next_seq);
        self.next_seq += 1;
        queue.insert(key, message);
        true
    }

    /// Remove every message `classify` reports as ready, dropping old ones.
    ///
    /// Each sender's queue is walked in priority order and stops at its first
    /// future message. Ready messages come back ordered by
    /// `(view, code priority)`.
    pub fn drain<F>(&mut self, mut classify: F) -> Vec<ConsensusMessage>
    where
        F: FnMut(View, &ConsensusMessage) -> Readiness,
    {
        let mut ready: Vec<(BacklogKey, ConsensusMessage)> = Vec::new();

        for queue in self.queues.values_mut() {
            while let Some(entry) = queue.first_entry() {
                let (view, _, _) = *entry.key();
                match classify(view, entry.get()) {
                    Readiness::Future => break,
                    Readiness::Old => {
                        entry.remove();
                    }
                    Readiness::Ready => {
                        let (key, message) = entry.remove_entry();
                        ready.push((key, message));
                    }
                }
            }
        }
        self.queues.retain(|_, queue| !queue.is_empty());

        ready.sort_by_key(|(key, _)| *key);
        ready.into_iter().map(|(_, message)| message).collect()
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
