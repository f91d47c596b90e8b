//! Domain layer for the Istanbul BFT core
//!
//! Pure data structures and rules. Nothing in here performs I/O or reads a
//! clock; the service layer drives these types from its event loop.

mod backlog;
mod block;
mod config;
mod error;
mod message;
mod message_set;
mod round_change_set;
mod round_state;
mod seal;
mod stats;
mod validator;
mod view;
mod vrank;

pub use backlog::*;
pub use block::*;
pub use config::*;
pub use error::*;
pub use message::*;
pub use message_set::*;
pub use round_change_set::*;
pub use round_state::*;
pub use seal::*;
pub use stats::*;
pub use validator::*;
pub use view::*;
pub use vrank::*;
