//! Validator set view
//!
//! The core only reads the validator set: size, fault tolerance, proposer
//! rotation and committee membership. Membership itself is computed by the
//! ledger backend.

use super::view::View;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use shared_crypto::{Address, Hash};
use std::sync::Arc;

/// Proposer rotation policy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposerPolicy {
    /// Move to the next validator on every height and every round
    #[default]
    RoundRobin,
    /// Keep the last proposer at round 0, move only on round changes
    Sticky,
}

/// Validator set with proposer selection
///
/// Validators are kept sorted by address so every node derives the same
/// indices from the same membership.
#[derive(Clone, Debug)]
pub struct ValidatorSet {
    validators: Arc<Vec<Address>>,
    policy: ProposerPolicy,
    sub_size: usize,
    last_proposer: Option<Address>,
    proposer: Option<Address>,
}

impl ValidatorSet {
    /// Create a new validator set. Duplicate addresses are collapsed.
    pub fn new(mut addresses: Vec<Address>, policy: ProposerPolicy, sub_size: usize) -> Self {
        addresses.sort_unstable();
        addresses.dedup();
        Self {
            validators: Arc::new(addresses),
            policy,
            sub_size: sub_size.max(1),
            last_proposer: None,
            proposer: None,
        }
    }

    /// Same membership under another rotation policy and committee size
    pub fn with_rules(&self, policy: ProposerPolicy, sub_size: usize) -> Self {
        Self {
            validators: Arc::clone(&self.validators),
            policy,
            sub_size: sub_size.max(1),
            last_proposer: None,
            proposer: None,
        }
    }

    /// Empty set used before the first sequence starts
    pub fn empty() -> Self {
        Self::new(Vec::new(), ProposerPolicy::default(), 1)
    }

    /// Get the number of validators
    pub fn size(&self) -> usize {
        self.validators.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Sorted validator addresses
    pub fn list(&self) -> &[Address] {
        &self.validators
    }

    pub fn policy(&self) -> ProposerPolicy {
        self.policy
    }

    /// Configured committee size
    pub fn sub_group_size(&self) -> usize {
        self.sub_size
    }

    /// Effective committee size for any view
    pub fn committee_size(&self) -> usize {
        self.size().min(self.sub_size)
    }

    /// Check if a validator is in the set
    pub fn contains(&self, address: &Address) -> bool {
        self.validators.binary_search(address).is_ok()
    }

    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.validators.binary_search(address).ok()
    }

    pub fn get_by_index(&self, index: usize) -> Option<Address> {
        self.validators.get(index).copied()
    }

    /// Maximum tolerated faulty validators: `ceil(m / 3) - 1` over the
    /// committee size `m`.
    pub fn f(&self) -> usize {
        let members = self.committee_size();
        if members == 0 {
            return 0;
        }
        (members + 2) / 3 - 1
    }

    /// Number of distinct validators forming a quorum (`2f + 1`)
    pub fn quorum_size(&self) -> usize {
        2 * self.f() + 1
    }

    /// Fix the proposer for `round` after `last_proposer`.
    pub fn calc_proposer(&mut self, last_proposer: Option<Address>, round: u64) {
        self.last_proposer = last_proposer;
        self.proposer = self.select(last_proposer.as_ref(), round);
    }

    /// Proposer fixed by the last `calc_proposer` call
    pub fn proposer(&self) -> Option<Address> {
        self.proposer
    }

    pub fn is_proposer(&self, address: &Address) -> bool {
        self.proposer.as_ref() == Some(address)
    }

    pub fn last_proposer(&self) -> Option<Address> {
        self.last_proposer
    }

    /// Proposer for an arbitrary round after the recorded last proposer
    pub fn proposer_for_round(&self, round: u64) -> Option<Address> {
        self.select(self.last_proposer.as_ref(), round)
    }

    fn select(&self, last_proposer: Option<&Address>, round: u64) -> Option<Address> {
        let size = self.size() as u64;
        if size == 0 {
            return None;
        }
        let seed = match last_proposer {
            None => round,
            Some(last) => {
                // An unknown last proposer counts as index 0
                let offset = self.index_of(last).unwrap_or(0) as u64;
                let seed = offset.wrapping_add(round);
                match self.policy {
                    ProposerPolicy::RoundRobin => seed.wrapping_add(1),
                    ProposerPolicy::Sticky => seed,
                }
            }
        };
        self.get_by_index((seed % size) as usize)
    }

    /// Committee for `view` on top of `prev_hash`.
    ///
    /// Small sets use every validator. Larger sets take the proposer, the
    /// next proposer, then a shuffle of the rest seeded by `prev_hash`.
    pub fn sub_list(&self, prev_hash: &Hash, view: &View) -> Vec<Address> {
        if self.size() <= self.sub_size {
            return self.validators.to_vec();
        }
        let Some(proposer) = self.proposer_for_round(view.round) else {
            return Vec::new();
        };
        let mut next = self.select(Some(&proposer), view.round).unwrap_or(proposer);
        if next == proposer {
            let index = self.index_of(&proposer).unwrap_or(0);
            next = self.validators[(index + 1) % self.size()];
        }

        let mut rest: Vec<Address> = self
            .validators
            .iter()
            .filter(|address| **address != proposer && **address != next)
            .copied()
            .collect();
        let mut rng = StdRng::seed_from_u64(committee_seed(prev_hash));
        rest.shuffle(&mut rng);

        let mut committee = Vec::with_capacity(self.sub_size);
        committee.push(proposer);
        committee.push(next);
        committee.extend(rest);
        committee.truncate(self.sub_size);
        committee
    }

    pub fn check_in_committee(&self, prev_hash: &Hash, view: &View, address: &Address) -> bool {
        if self.size() <= self.sub_size {
            return self.contains(address);
        }
        self.sub_list(prev_hash, view).contains(address)
    }
}

/// First 15 hex digits of the parent hash
fn committee_seed(prev_hash: &Hash) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&prev_hash[..8]);
    u64::from_be_bytes(head) >> 4
}
