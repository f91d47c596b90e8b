//! Driven ports (Outbound dependencies)

use crate::domain::{ConsensusMessage, Proposal, ValidatorSet, View};
use shared_crypto::{Address, Hash, RecoverableSignature};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Ledger-side failures reported to the core
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Commit rejected: {0}")]
    Commit(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Outcome of a failed proposal check
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Valid once its timestamp is reached
    #[error("Proposal is {0:?} ahead of local time")]
    FutureBlock(Duration),

    #[error("Invalid proposal: {0}")]
    Invalid(String),
}

/// Ledger, signer and transport of one validator.
///
/// The backend owns key material and chain storage; the core only asks.
pub trait Backend: Send + Sync {
    type Proposal: Proposal;

    /// This node's validator address
    fn address(&self) -> Address;

    /// Chain head and the address that proposed it
    fn last_proposal(&self) -> (Self::Proposal, Option<Address>);

    /// Validator set effective on top of `proposal`
    fn validators(&self, proposal: &Self::Proposal) -> ValidatorSet;

    fn verify(&self, proposal: &Self::Proposal) -> Result<(), VerifyError>;

    /// Sign with the validator key
    fn sign(&self, data: &[u8]) -> Result<RecoverableSignature, BackendError>;

    /// Finalize `proposal`. Success is followed by a `FinalCommitted` event.
    fn commit(
        &self,
        proposal: &Self::Proposal,
        seals: Vec<RecoverableSignature>,
    ) -> Result<(), BackendError>;

    fn has_bad_proposal(&self, hash: &Hash) -> bool;

    /// Send an encoded message to the validators of `prev_hash`
    fn broadcast(
        &self,
        prev_hash: &Hash,
        validators: &ValidatorSet,
        payload: Vec<u8>,
    ) -> Result<(), BackendError>;

    /// Relay a handled peer message to the committee
    fn gossip_sub_peer(&self, prev_hash: &Hash, validators: &ValidatorSet, payload: &[u8]);
}

/// Signer recovery
pub trait SignatureVerifier: Send + Sync {
    /// Recover signer address from a 65-byte recoverable signature
    fn recover_signer(&self, message: &[u8], signature: &RecoverableSignature) -> Option<Address>;
}

/// The two timers owned by the core.
///
/// Arming a timer replaces any previous arming of the same timer. Fired
/// timers post events back to the core's queue.
pub trait RoundTimers: Send {
    /// Post `Timeout { next_view }` after `timeout`
    fn start_round_change(&mut self, next_view: View, timeout: Duration);

    /// Post `Deliver(message)` after `delay`
    fn start_future_preprepare(&mut self, message: ConsensusMessage, delay: Duration);

    fn stop_future_preprepare(&mut self);

    fn stop_all(&mut self);
}

/// Clock used for durations reported by the core
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
