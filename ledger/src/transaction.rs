//! Pending-transaction record.

use {
    serde::{Deserialize, Serialize},
    std::cmp::Ordering,
    tripcoin_crypto::Address,
};

/// Length of a content hash rendered as hex.
const HASH_HEX_LEN: usize = 64;

/// A transfer awaiting inclusion in a block.
///
/// `hash` is the content-addressed identity and the mempool key. `fee` is
/// always derived locally as `gas_limit × gas_price` — the wire value is
/// overwritten on admission and never trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Transaction {
    pub hash: String,
    pub from: Address,
    pub to: Address,
    pub amount: u64,
    pub gas_limit: u64,
    /// Serialized size in bytes, as reported at submission.
    pub size: u64,
    pub fee: u64,
}

impl Transaction {
    /// Structural validation: the fields the rest of the pipeline assumes.
    ///
    /// Returns the first problem found, or `None` when well-formed.
    pub fn shape_problem(&self) -> Option<&'static str> {
        let hash_ok = self.hash.len() == HASH_HEX_LEN
            && self
                .hash
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        if !hash_ok {
            return Some("hash is not 64 lowercase hex chars");
        }
        if self.from.is_system() {
            return Some("sender cannot be the system identity");
        }
        if self.size == 0 {
            return Some("size must be nonzero");
        }
        None
    }

    /// Fee density (`fee / size`) comparison without float drift.
    ///
    /// Compares `self.fee / self.size` against `other.fee / other.size`
    /// via u128 cross-products. Ties break by hash ascending so ordering is
    /// total and identical on every node.
    pub fn cmp_fee_density(&self, other: &Self) -> Ordering {
        let lhs = (self.fee as u128) * (other.size as u128);
        let rhs = (other.fee as u128) * (self.size as u128);
        lhs.cmp(&rhs).then_with(|| self.hash.cmp(&other.hash))
    }
}
