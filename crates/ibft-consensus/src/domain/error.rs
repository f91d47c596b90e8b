//! Error types for the consensus core
//!
//! Every handler returns `ConsensusResult`; the event loop logs and swallows
//! all of these. None of them aborts the state machine.

use super::message::MessageCode;
use shared_crypto::{Address, CryptoError, Hash};
use std::time::Duration;

/// Encoding / decoding failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed encoding: {0}")]
    Malformed(String),

    #[error("Message exceeds size limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Unknown message code: {0}")]
    UnknownCode(u8),

    #[error("Invalid committed seal length {len} for {code} message")]
    InvalidSealLength { code: MessageCode, len: usize },

    #[error("Invalid proposal encoding: {0}")]
    Proposal(String),
}

impl From<bincode::Error> for CodecError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::SizeLimit => CodecError::Malformed("size limit exceeded".into()),
            other => CodecError::Malformed(other.to_string()),
        }
    }
}

/// Consensus error types
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Decode error: {0}")]
    Decode(#[from] CodecError),

    #[error("Signature recovery failed: {0}")]
    Auth(#[from] CryptoError),

    #[error("Sender mismatch: claimed {}, recovered {}", hex::encode(.claimed), hex::encode(.recovered))]
    SenderMismatch { claimed: Address, recovered: Address },

    #[error("Invalid committed seal from {}", hex::encode(.0))]
    InvalidCommittedSeal(Address),

    #[error("Unauthorized address: {}", hex::encode(.0))]
    UnauthorizedAddress(Address),

    #[error("Sender {} is not in the committee", hex::encode(.0))]
    NotInCommittee(Address),

    #[error("Duplicate message from {}", hex::encode(.0))]
    Duplicate(Address),

    #[error("Too many rounds with round change votes from {}", hex::encode(.0))]
    TooManyRoundChanges(Address),

    #[error("Future message")]
    FutureMessage,

    #[error("Old message")]
    OldMessage,

    #[error("Inconsistent subject")]
    InconsistentSubject,

    #[error("Message not from proposer: {}", hex::encode(.0))]
    NotFromProposer(Address),

    #[error("Invalid parent: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    InvalidParent { expected: Hash, actual: Hash },

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("Proposal is from the future, retry in {0:?}")]
    FutureProposal(Duration),

    #[error("Ledger commit failed: {0}")]
    LedgerCommit(String),

    #[error("Insufficient committed seals: got {got}, required {required}")]
    InsufficientSeals { got: usize, required: usize },

    #[error("Hash lock conflict: locked {}, proposed {}", hex::encode(.locked), hex::encode(.proposed))]
    HashLockConflict { locked: Hash, proposed: Hash },

    #[error("No preprepare for the current round")]
    NoPreprepare,

    #[error("Message ignored")]
    Ignored,

    #[error("Stale timeout event")]
    StaleTimeout,

    #[error("Consensus core is not started")]
    NotStarted,
}

impl ConsensusError {
    /// Errors that are part of normal operation and only worth a trace line.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ConsensusError::FutureMessage
                | ConsensusError::OldMessage
                | ConsensusError::Duplicate(_)
                | ConsensusError::Ignored
                | ConsensusError::StaleTimeout
        )
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
