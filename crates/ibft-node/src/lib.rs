//! # IBFT Devnet
//!
//! In-process validator network for exercising the consensus core end to
//! end.
//!
//! ```text
//!            ┌──────────── LocalNetwork ────────────┐
//!            ↓                 ↓                    ↓
//!   Core(v0) + Memory    Core(v1) + Memory    Core(vN) + Memory
//!       ↑ Request            ↑ Request            ↑ Request
//!   producer(v0)         producer(v1)         producer(vN)
//! ```
//!
//! Each producer waits for its ledger head to move, then submits a block on
//! top of it. Only the proposer of the current round turns it into a
//! Preprepare; the others keep it in case the round changes.

pub mod config;
pub mod devnet;

pub use config::{ConfigError, NodeConfig};
pub use devnet::{Devnet, DevnetError, NodeReport};
