//! Per-view collection of messages, one per validator

use super::error::{ConsensusError, ConsensusResult};
use super::message::ConsensusMessage;
use super::validator::ValidatorSet;
use super::view::View;
use shared_crypto::Address;
use std::collections::HashMap;

/// Messages of one kind for one view, keyed by sender.
#[derive(Clone, Debug)]
pub struct MessageSet {
    view: View,
    validators: ValidatorSet,
    messages: HashMap<Address, ConsensusMessage>,
}

impl MessageSet {
    pub fn new(view: View, validators: ValidatorSet) -> Self {
        Self {
            view,
            validators,
            messages: HashMap::new(),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Insert a message. Returns the new size.
    ///
    /// Senders outside the validator set are rejected, as is a second
    /// message from the same sender.
    pub fn add(&mut self, message: ConsensusMessage) -> ConsensusResult<usize> {
        if !self.validators.contains(&message.sender) {
            return Err(ConsensusError::UnauthorizedAddress(message.sender));
        }
        if self.messages.contains_key(&message.sender) {
            return Err(ConsensusError::Duplicate(message.sender));
        }
        self.messages.insert(message.sender, message);
        Ok(self.messages.len())
    }

    pub fn size(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &ConsensusMessage> {
        self.messages.values()
    }

    pub fn senders(&self) -> impl Iterator<Item = &Address> {
        self.messages.keys()
    }

    pub fn has(&self, sender: &Address) -> bool {
        self.messages.contains_key(sender)
    }

    pub fn get(&self, sender: &Address) -> Option<&ConsensusMessage> {
        self.messages.get(sender)
    }
}
