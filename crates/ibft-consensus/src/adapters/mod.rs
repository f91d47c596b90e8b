//! Adapters layer
//!
//! Concrete implementations of the ports: secp256k1 recovery, tokio and
//! recording timers, an in-process network and an in-memory ledger.

mod memory;
mod network;
mod timers;
mod verifier;

pub use memory::*;
pub use network::*;
pub use timers::*;
pub use verifier::*;
