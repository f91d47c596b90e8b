//! # Shared Crypto
//!
//! Cryptographic primitives used by the consensus core and its adapters.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | Keccak-256 | Block hashes, signing prehash |
//! | `ecdsa` | secp256k1 | Validator message signing and sender recovery |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic nonces, low-S normalization (EIP-2)
//! - **Addresses**: last 20 bytes of Keccak-256 over the uncompressed public key

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;

// Re-exports
pub use ecdsa::{recover_address, Address, RecoverableSignature, Secp256k1KeyPair, SIGNATURE_LENGTH};
pub use errors::CryptoError;
pub use hashing::{keccak256, keccak256_concat, Hash};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
