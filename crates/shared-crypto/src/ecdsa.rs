//! # Recoverable ECDSA Signatures (secp256k1)
//!
//! Validator identities are 20-byte addresses derived from secp256k1 public
//! keys. Every signature carries a recovery id so the signer's address can
//! be recovered from `(data, signature)` alone.
//!
//! ## Layout
//!
//! ```text
//! signature = r (32) ‖ s (32) ‖ v (1)      v ∈ {0, 1}   (27/28 accepted on input)
//! address   = keccak256(uncompressed_pubkey[1..])[12..]
//! ```
//!
//! The signed message is always `keccak256(data)`.

use crate::hashing::keccak256;
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zeroize::{Zeroize, Zeroizing};

/// Validator address (20 bytes).
pub type Address = [u8; 20];

/// Length of a recoverable signature in bytes.
pub const SIGNATURE_LENGTH: usize = 65;

/// Recoverable signature `r ‖ s ‖ v`.
pub type RecoverableSignature = [u8; SIGNATURE_LENGTH];

/// secp256k1 ECDSA keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }

    /// Derive a keypair from a numeric seed.
    ///
    /// Intended for devnets and tests where validator keys must be
    /// reproducible across processes.
    pub fn from_seed(seed: u64) -> Result<Self, CryptoError> {
        let mut material = keccak256(&seed.to_be_bytes());
        let keypair = Self::from_bytes(material);
        material.zeroize();
        keypair
    }

    /// Address of this keypair.
    pub fn address(&self) -> Address {
        address_from_pubkey(self.signing_key.verifying_key())
    }

    /// Sign `keccak256(data)` and return `r ‖ s ‖ v`.
    pub fn sign_recoverable(&self, data: &[u8]) -> Result<RecoverableSignature, CryptoError> {
        let digest = keccak256(data);
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte();
        Ok(out)
    }

    /// Secret key bytes, wiped when the returned buffer is dropped.
    pub fn to_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes().into())
    }
}

impl std::fmt::Debug for Secp256k1KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secp256k1KeyPair")
            .field("address", &hex_address(&self.address()))
            .finish()
    }
}

/// Recover the signer address of `data` from a recoverable signature.
pub fn recover_address(
    data: &[u8],
    signature: &RecoverableSignature,
) -> Result<Address, CryptoError> {
    let recovery_id = parse_recovery_id(signature[64])?;

    let sig = Signature::from_slice(&signature[..64])
        .map_err(|_| CryptoError::InvalidSignatureFormat)?;

    let digest = keccak256(data);
    let recovered_key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered_key))
}

/// Derive address from a verifying key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    // Skip the 0x04 prefix
    let hash = keccak256(&pubkey_bytes.as_bytes()[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, CryptoError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(CryptoError::InvalidRecoveryId(v)),
    };

    RecoveryId::try_from(id).map_err(|_| CryptoError::InvalidRecoveryId(v))
}

fn hex_address(address: &Address) -> String {
    address.iter().map(|b| format!("{:02x}", b)).collect()
}
