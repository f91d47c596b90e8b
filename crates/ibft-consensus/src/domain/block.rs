//! Proposals and the reference block type

use super::error::CodecError;
use bincode::Options;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{
    keccak256, keccak256_concat, recover_address, Address, CryptoError, Hash,
    RecoverableSignature, Secp256k1KeyPair,
};
use std::fmt::Debug;

/// A value agreed upon at one sequence.
///
/// The core treats proposals as opaque: it reads the hash, the height and the
/// parent link, and ships the encoded bytes inside Preprepare messages.
pub trait Proposal: Clone + Debug + Send + Sync + 'static {
    /// Digest identifying the proposal
    fn hash(&self) -> Hash;

    /// Height this proposal is for
    fn number(&self) -> u64;

    /// Hash of the proposal it extends
    fn parent_hash(&self) -> Hash;

    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Block header. Seals are not part of the hash.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub parent_hash: Hash,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
    pub proposer: Address,
    pub payload: Vec<u8>,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        let payload_hash = keccak256(&self.payload);
        keccak256_concat(&[
            &self.number.to_be_bytes(),
            &self.parent_hash,
            &self.timestamp.to_be_bytes(),
            &self.proposer,
            &payload_hash,
        ])
    }
}

/// Block with proposer and committed seals
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    /// Proposer signature over the header hash
    #[serde_as(as = "Option<Bytes>")]
    pub proposer_seal: Option<RecoverableSignature>,
    /// Commit seals gathered by the round that finalized this block
    #[serde_as(as = "Vec<Bytes>")]
    pub committed_seals: Vec<RecoverableSignature>,
}

impl Block {
    pub fn genesis() -> Self {
        Self {
            header: BlockHeader {
                number: 0,
                parent_hash: [0u8; 32],
                timestamp: 0,
                proposer: [0u8; 20],
                payload: Vec::new(),
            },
            proposer_seal: None,
            committed_seals: Vec::new(),
        }
    }

    /// Unsealed block extending `parent`
    pub fn child_of(parent: &Block, proposer: Address, timestamp: u64, payload: Vec<u8>) -> Self {
        Self {
            header: BlockHeader {
                number: parent.header.number + 1,
                parent_hash: parent.hash(),
                timestamp,
                proposer,
                payload,
            },
            proposer_seal: None,
            committed_seals: Vec::new(),
        }
    }

    pub fn with_proposer_seal(mut self, seal: RecoverableSignature) -> Self {
        self.proposer_seal = Some(seal);
        self
    }

    /// Sign the header hash as proposer
    pub fn sealed_by(self, keypair: &Secp256k1KeyPair) -> Result<Self, CryptoError> {
        let seal = keypair.sign_recoverable(&self.hash())?;
        Ok(self.with_proposer_seal(seal))
    }

    /// Address recovered from the proposer seal
    pub fn seal_signer(&self) -> Option<Address> {
        let seal = self.proposer_seal.as_ref()?;
        recover_address(&self.hash(), seal).ok()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.number == 0
    }

    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .reject_trailing_bytes()
    }
}

impl Proposal for Block {
    fn hash(&self) -> Hash {
        self.header.hash()
    }

    fn number(&self) -> u64 {
        self.header.number
    }

    fn parent_hash(&self) -> Hash {
        self.header.parent_hash
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Self::options()
            .serialize(self)
            .map_err(|err| CodecError::Proposal(err.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::options()
            .deserialize(bytes)
            .map_err(|err| CodecError::Proposal(err.to_string()))
    }
}
