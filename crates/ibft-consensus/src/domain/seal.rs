//! Commit seal assembly and verification

use super::error::{ConsensusError, ConsensusResult};
use super::message::MessageCode;
use super::message_set::MessageSet;
use super::validator::ValidatorSet;
use shared_crypto::{Address, Hash, RecoverableSignature};
use std::collections::HashSet;

/// Bytes signed by a committed seal: `digest ‖ [Commit]`
pub fn prepare_committed_seal(digest: &Hash) -> Vec<u8> {
    let mut data = Vec::with_capacity(digest.len() + 1);
    data.extend_from_slice(digest);
    data.push(MessageCode::Commit.as_u8());
    data
}

/// Committed seals of a commit set, ordered by sender address
pub fn collect_committed_seals(commits: &MessageSet) -> Vec<RecoverableSignature> {
    let mut messages: Vec<_> = commits.values().collect();
    messages.sort_by_key(|message| message.sender);
    messages
        .into_iter()
        .filter_map(|message| message.committed_seal)
        .collect()
}

/// Check that `seals` carry more than `2f` distinct validator signatures over
/// `hash`. Returns the number of valid seals.
pub fn verify_committed_seals<F>(
    hash: &Hash,
    seals: &[RecoverableSignature],
    validators: &ValidatorSet,
    recover: F,
) -> ConsensusResult<usize>
where
    F: Fn(&[u8], &RecoverableSignature) -> Option<Address>,
{
    let data = prepare_committed_seal(hash);
    let mut remaining: HashSet<Address> = validators.list().iter().copied().collect();

    for seal in seals {
        let signer = recover(&data, seal).ok_or(ConsensusError::InvalidCommittedSeal([0u8; 20]))?;
        // Unknown and repeated signers both fail here
        if !remaining.remove(&signer) {
            return Err(ConsensusError::InvalidCommittedSeal(signer));
        }
    }

    let required = 2 * validators.f() + 1;
    if seals.len() < required {
        return Err(ConsensusError::InsufficientSeals {
            got: seals.len(),
            required,
        });
    }
    Ok(seals.len())
}
