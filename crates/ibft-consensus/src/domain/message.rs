//! Consensus messages and their canonical encoding
//!
//! ## Wire layout
//!
//! ```text
//! outer:  { code: u8, prev_hash: [32], body: bytes, sender: [20],
//!           signature: [65], committed_seal: [0 | 65] }
//! body:   Preprepare                   -> { view, proposal: bytes }
//!         Prepare / Commit / RoundChange -> Subject { view, digest, prev_hash }
//! ```
//!
//! The signature covers `code ‖ prev_hash ‖ body`. All structures are encoded
//! with bincode (fixed-width integers, bounded size, no trailing bytes).

use super::block::Proposal;
use super::error::{CodecError, ConsensusError, ConsensusResult};
use super::seal::prepare_committed_seal;
use super::view::View;
use bincode::Options;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{Address, Hash, RecoverableSignature, SIGNATURE_LENGTH};
use std::fmt;

/// Message type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessageCode {
    Preprepare = 0,
    Prepare = 1,
    Commit = 2,
    RoundChange = 3,
}

impl MessageCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Replay priority inside one view: RoundChange < Preprepare < Prepare < Commit
    pub fn priority(self) -> u8 {
        match self {
            MessageCode::RoundChange => 0,
            MessageCode::Preprepare => 1,
            MessageCode::Prepare => 2,
            MessageCode::Commit => 3,
        }
    }
}

impl TryFrom<u8> for MessageCode {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageCode::Preprepare),
            1 => Ok(MessageCode::Prepare),
            2 => Ok(MessageCode::Commit),
            3 => Ok(MessageCode::RoundChange),
            other => Err(CodecError::UnknownCode(other)),
        }
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageCode::Preprepare => "PREPREPARE",
            MessageCode::Prepare => "PREPARE",
            MessageCode::Commit => "COMMIT",
            MessageCode::RoundChange => "ROUND_CHANGE",
        };
        f.write_str(name)
    }
}

/// Body of Prepare, Commit and RoundChange messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub view: View,
    /// Proposal hash; zero for RoundChange
    pub digest: Hash,
    pub prev_hash: Hash,
}

/// Decoded Preprepare body
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preprepare<P> {
    pub view: View,
    pub proposal: P,
}

#[derive(Serialize, Deserialize)]
struct PreprepareBody {
    view: View,
    proposal: Vec<u8>,
}

/// An authenticated consensus message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusMessage {
    pub code: MessageCode,
    pub prev_hash: Hash,
    pub body: Vec<u8>,
    pub sender: Address,
    pub signature: RecoverableSignature,
    /// Present exactly on Commit messages
    pub committed_seal: Option<RecoverableSignature>,
}

impl ConsensusMessage {
    /// Bytes covered by `signature`: `code ‖ prev_hash ‖ body`
    pub fn signing_payload(&self) -> Vec<u8> {
        signing_payload(self.code, &self.prev_hash, &self.body)
    }

    /// Check that `signature` recovers to `sender`.
    pub fn verify_sender<F>(&self, recover: F) -> ConsensusResult<()>
    where
        F: Fn(&[u8], &RecoverableSignature) -> Option<Address>,
    {
        let recovered = recover(&self.signing_payload(), &self.signature).ok_or(
            ConsensusError::Auth(shared_crypto::CryptoError::RecoveryFailed),
        )?;
        if recovered != self.sender {
            return Err(ConsensusError::SenderMismatch {
                claimed: self.sender,
                recovered,
            });
        }
        Ok(())
    }

    /// Check that the committed seal recovers to `sender` over
    /// `PrepareCommittedSeal(digest)`.
    pub fn verify_committed_seal<F>(&self, digest: &Hash, recover: F) -> ConsensusResult<()>
    where
        F: Fn(&[u8], &RecoverableSignature) -> Option<Address>,
    {
        let seal = self
            .committed_seal
            .as_ref()
            .ok_or(ConsensusError::InvalidCommittedSeal(self.sender))?;
        match recover(&prepare_committed_seal(digest), seal) {
            Some(signer) if signer == self.sender => Ok(()),
            _ => Err(ConsensusError::InvalidCommittedSeal(self.sender)),
        }
    }
}

/// `code ‖ prev_hash ‖ body`
pub fn signing_payload(code: MessageCode, prev_hash: &Hash, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + prev_hash.len() + body.len());
    payload.push(code.as_u8());
    payload.extend_from_slice(prev_hash);
    payload.extend_from_slice(body);
    payload
}

#[serde_as]
#[derive(Serialize, Deserialize)]
struct WireMessage {
    code: u8,
    prev_hash: Hash,
    body: Vec<u8>,
    sender: Address,
    #[serde_as(as = "Bytes")]
    signature: RecoverableSignature,
    committed_seal: Vec<u8>,
}

/// Canonical encoder/decoder for consensus messages
#[derive(Clone, Copy, Debug)]
pub struct MessageCodec {
    limit: u64,
}

impl MessageCodec {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn options(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(self.limit)
            .reject_trailing_bytes()
    }

    /// Encode the outer message.
    pub fn encode(&self, message: &ConsensusMessage) -> Result<Vec<u8>, CodecError> {
        let wire = WireMessage {
            code: message.code.as_u8(),
            prev_hash: message.prev_hash,
            body: message.body.clone(),
            sender: message.sender,
            signature: message.signature,
            committed_seal: message
                .committed_seal
                .map(|seal| seal.to_vec())
                .unwrap_or_default(),
        };
        Ok(self.options().serialize(&wire)?)
    }

    /// Decode the outer message. Authentication is a separate step.
    pub fn decode(&self, bytes: &[u8]) -> Result<ConsensusMessage, CodecError> {
        if bytes.len() as u64 > self.limit {
            return Err(CodecError::TooLarge { limit: self.limit });
        }
        let wire: WireMessage = self.options().deserialize(bytes)?;
        let code = MessageCode::try_from(wire.code)?;

        let committed_seal = match (code, wire.committed_seal.len()) {
            (MessageCode::Commit, SIGNATURE_LENGTH) => {
                let mut seal = [0u8; SIGNATURE_LENGTH];
                seal.copy_from_slice(&wire.committed_seal);
                Some(seal)
            }
            (MessageCode::Commit, len) => return Err(CodecError::InvalidSealLength { code, len }),
            (_, 0) => None,
            (_, len) => return Err(CodecError::InvalidSealLength { code, len }),
        };

        Ok(ConsensusMessage {
            code,
            prev_hash: wire.prev_hash,
            body: wire.body,
            sender: wire.sender,
            signature: wire.signature,
            committed_seal,
        })
    }

    pub fn encode_subject(&self, subject: &Subject) -> Result<Vec<u8>, CodecError> {
        Ok(self.options().serialize(subject)?)
    }

    pub fn decode_subject(&self, bytes: &[u8]) -> Result<Subject, CodecError> {
        Ok(self.options().deserialize(bytes)?)
    }

    pub fn encode_preprepare<P: Proposal>(
        &self,
        preprepare: &Preprepare<P>,
    ) -> Result<Vec<u8>, CodecError> {
        let body = PreprepareBody {
            view: preprepare.view,
            proposal: preprepare.proposal.encode()?,
        };
        Ok(self.options().serialize(&body)?)
    }

    pub fn decode_preprepare<P: Proposal>(&self, bytes: &[u8]) -> Result<Preprepare<P>, CodecError> {
        let body: PreprepareBody = self.options().deserialize(bytes)?;
        Ok(Preprepare {
            view: body.view,
            proposal: P::decode(&body.proposal)?,
        })
    }

    /// View carried by a message body, without decoding the proposal.
    pub fn decode_view(&self, message: &ConsensusMessage) -> Result<View, CodecError> {
        match message.code {
            MessageCode::Preprepare => {
                let body: PreprepareBody = self.options().deserialize(&message.body)?;
                Ok(body.view)
            }
            _ => Ok(self.decode_subject(&message.body)?.view),
        }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new(super::config::ConsensusConfig::default().max_message_size)
    }
}
