//! Ports layer
//!
//! The core drives everything outside itself through these traits. All of
//! them are synchronous: a call is observed as one atomic step of the event
//! loop.

mod outbound;

pub use outbound::*;
