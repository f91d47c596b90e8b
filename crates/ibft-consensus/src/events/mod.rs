//! Events consumed by the core's event loop

use crate::domain::{ConsensusMessage, View};

/// Everything that can move the state machine.
///
/// Transport payloads arrive as raw bytes and are authenticated by the core.
/// `Deliver` carries messages the core already trusts: its own broadcasts,
/// backlog replays and future preprepares whose timer fired.
#[derive(Debug)]
pub enum CoreEvent<P> {
    /// Encoded message from a peer
    Message { payload: Vec<u8> },
    /// Proposal to put forward at its sequence
    Request(P),
    /// Round-change timer fired for `next_view`
    Timeout { next_view: View },
    /// The ledger finalized a block
    FinalCommitted,
    Deliver(ConsensusMessage),
    Shutdown,
}

impl<P> CoreEvent<P> {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreEvent::Message { .. } => "message",
            CoreEvent::Request(_) => "request",
            CoreEvent::Timeout { .. } => "timeout",
            CoreEvent::FinalCommitted => "final_committed",
            CoreEvent::Deliver(_) => "deliver",
            CoreEvent::Shutdown => "shutdown",
        }
    }
}
