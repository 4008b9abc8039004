//! Leader schedule.
//!
//! Deterministic round-robin over the address-ordered active set: the
//! leader of view `v` is `activeValidators[v mod N]`. Every peer must agree
//! on this for any view, which is why the registry's address-ascending
//! ordering is load-bearing.

use {crate::registry::ValidatorSet, tripcoin_crypto::Address};

/// The leader (primary) of `view`, or `None` for an empty set.
pub fn leader_of(validator_set: &ValidatorSet, view: u64) -> Option<&Address> {
    if validator_set.is_empty() {
        return None;
    }
    let index = (view % validator_set.len() as u64) as usize;
    validator_set.at(index).map(|v| &v.address)
}

/// Whether `identity` is the leader of `view`.
pub fn is_leader(validator_set: &ValidatorSet, identity: &Address, view: u64) -> bool {
    leader_of(validator_set, view).is_some_and(|leader| leader == identity)
}
