//! secp256k1 signer recovery

use crate::ports::SignatureVerifier;
use shared_crypto::{recover_address, Address, RecoverableSignature};

/// Recovers Ethereum-style addresses from keccak-prehashed signatures
#[derive(Clone, Copy, Debug, Default)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn recover_signer(&self, message: &[u8], signature: &RecoverableSignature) -> Option<Address> {
        recover_address(message, signature).ok()
    }
}
