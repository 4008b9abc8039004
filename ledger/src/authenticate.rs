//! Stateless block authentication.
//!
//! [`verify_block`] is consulted by the consensus replica when a
//! PRE-PREPARE references a block, and again at finalization. It holds no
//! state of its own: parent linkage comes in as an argument and validator
//! keys come from the [`ValidatorKeys`] seam so this crate stays below the
//! registry in the dependency graph.

use {
    crate::block::{compute_hash, Block, GENESIS_PARENT_HASH},
    std::collections::HashSet,
    tripcoin_crypto::{Address, PublicKey},
};

/// Key lookup for the validator set active at a block's view.
///
/// Returning `None` means the address is not an active validator; the
/// block is rejected, not errored.
pub trait ValidatorKeys {
    fn public_key_of(&self, address: &Address) -> Option<PublicKey>;
}

impl<F> ValidatorKeys for F
where
    F: Fn(&Address) -> Option<PublicKey>,
{
    fn public_key_of(&self, address: &Address) -> Option<PublicKey> {
        self(address)
    }
}

/// Outcome of authenticating a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// All checks passed.
    Accepted,
    /// The referenced parent is not locally known. Not fatal: the caller
    /// buffers the block and retries after a parent-gap recovery.
    UnknownParent,
    /// The block is invalid and must be dropped.
    Rejected(RejectReason),
}

/// Why a block failed authentication.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("stored hash does not match recomputed hash")]
    HashMismatch,
    #[error("bad linkage: index {index} after parent index {parent_index}")]
    IndexNotSequential { index: u64, parent_index: u64 },
    #[error("bad linkage: parent hash mismatch at index {index}")]
    ParentHashMismatch { index: u64 },
    #[error("malformed genesis block")]
    MalformedGenesis,
    #[error("validator {0} is not in the active set")]
    UnknownValidator(Address),
    #[error("validator signature does not verify")]
    BadSignature,
    #[error("transaction {hash} is malformed: {problem}")]
    MalformedTransaction { hash: String, problem: String },
    #[error("transaction {0} appears twice in the block")]
    DuplicateTransaction(String),
    #[error("total_fees {recorded} does not equal body sum {computed}")]
    FeeTotalMismatch { recorded: u64, computed: u64 },
}

/// Authenticate `block` against its expected parent.
///
/// Checks, in order: recomputed hash, parent linkage (with the genesis
/// special case), validator signature + set membership, and per-transaction
/// well-formedness including in-block dedup and the fee total.
pub fn verify_block(
    block: &Block,
    expected_parent: Option<&Block>,
    keys: &dyn ValidatorKeys,
) -> Verdict {
    if block.hash != compute_hash(block) {
        return Verdict::Rejected(RejectReason::HashMismatch);
    }

    if block.index == 0 {
        if block.parent_hash != GENESIS_PARENT_HASH || !block.validator.is_system() {
            return Verdict::Rejected(RejectReason::MalformedGenesis);
        }
        // Genesis is not forged by a validator; no signature to verify.
        return verify_body(block);
    }

    let parent = match expected_parent {
        Some(parent) => parent,
        None => return Verdict::UnknownParent,
    };
    if block.index != parent.index + 1 {
        return Verdict::Rejected(RejectReason::IndexNotSequential {
            index: block.index,
            parent_index: parent.index,
        });
    }
    if block.parent_hash != parent.hash {
        return Verdict::Rejected(RejectReason::ParentHashMismatch { index: block.index });
    }

    let public_key = match keys.public_key_of(&block.validator) {
        Some(pk) => pk,
        None => {
            return Verdict::Rejected(RejectReason::UnknownValidator(block.validator.clone()))
        }
    };
    if !public_key.verify_hex(block.hash.as_bytes(), &block.signature) {
        return Verdict::Rejected(RejectReason::BadSignature);
    }

    verify_body(block)
}

fn verify_body(block: &Block) -> Verdict {
    let mut seen: HashSet<&str> = HashSet::with_capacity(block.body.len());
    let mut fee_sum: u64 = 0;
    for tx in &block.body {
        if let Some(problem) = tx.shape_problem() {
            return Verdict::Rejected(RejectReason::MalformedTransaction {
                hash: tx.hash.clone(),
                problem: problem.to_string(),
            });
        }
        if !seen.insert(tx.hash.as_str()) {
            return Verdict::Rejected(RejectReason::DuplicateTransaction(tx.hash.clone()));
        }
        fee_sum = fee_sum.saturating_add(tx.fee);
    }
    if block.total_fees != fee_sum {
        return Verdict::Rejected(RejectReason::FeeTotalMismatch {
            recorded: block.total_fees,
            computed: fee_sum,
        });
    }
    Verdict::Accepted
}
