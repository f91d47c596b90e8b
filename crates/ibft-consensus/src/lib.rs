//! # ibft-consensus
//!
//! Istanbul BFT consensus core.
//!
//! ## Architecture
//!
//! A validator runs one [`Core`]: a single-threaded state machine that agrees
//! on one proposal per sequence through three phases.
//!
//! ```text
//! proposer ──PREPREPARE──→ all
//! all      ──PREPARE────→ all     2f+1 prepare|commit → Prepared (lock)
//! all      ──COMMIT─────→ all     2f+1 commit        → ledger commit
//! ```
//!
//! A round that stalls times out; validators vote with ROUND_CHANGE and the
//! proposer rotates. A node locked on a proposal only votes for that proposal
//! until the sequence ends.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ibft_consensus::{Core, ConsensusConfig, CoreEvent};
//! use ibft_consensus::adapters::{Secp256k1Verifier, TokioTimers};
//!
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let core = Core::new(backend, Arc::new(Secp256k1Verifier), TokioTimers::new(tx.clone()), ConsensusConfig::default());
//! let stats = core.run(rx).await;
//! ```
//!
//! ## Failure handling
//!
//! - Malformed, unauthenticated or out-of-committee messages are dropped
//! - Messages for a later view are parked in the backlog
//! - A misbehaving proposer or a failed ledger commit triggers a round change
//! - Locking two digests at one height is the only fatal condition

pub mod adapters;
pub mod domain;
pub mod events;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use domain::{
    Block, BlockHeader, CodecError, ConsensusConfig, ConsensusError, ConsensusMessage,
    ConsensusResult, ConsensusStats, MessageCode, MessageCodec, Proposal, ProposerPolicy, State,
    ValidatorSet, View, VrankReport,
};
pub use events::CoreEvent;
pub use ports::{Backend, BackendError, RoundTimers, SignatureVerifier, TimeSource, VerifyError};
pub use service::{check_message, Core};
