//! Block record, hashing, and forging.

use {
    crate::transaction::Transaction,
    chrono::{SecondsFormat, Utc},
    serde::{Deserialize, Serialize},
    tripcoin_crypto::{Address, Keypair},
};

/// Parent hash of the genesis block.
pub const GENESIS_PARENT_HASH: &str = "0";

/// Fixed timestamp of the genesis block. Every peer must produce a
/// byte-identical genesis record, so this never derives from the clock.
const GENESIS_TIMESTAMP: &str = "2024-01-01T00:00:00.000Z";

/// The two block flavors carried on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockType {
    Transaction,
    CriticalProcess,
}

/// A block as stored and shipped on the wire.
///
/// `hash` covers `index ‖ parent_hash ‖ timestamp ‖ canonical(body) ‖ nonce`
/// with an empty signature slot; `signature` is the validator's signature
/// over that hash. See the crate-level convention note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Block {
    pub index: u64,
    /// ISO-8601 wall-clock time at proposal.
    pub timestamp: String,
    pub parent_hash: String,
    pub hash: String,
    pub nonce: u64,
    pub validator: Address,
    /// Hex signature, or `""` before forging.
    pub signature: String,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub body: Vec<Transaction>,
    pub total_fees: u64,
}

/// Current wall-clock time in the block timestamp format.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Compute a block's hash with the signature slot blanked.
///
/// The preimage is the concatenation of the deterministic fields with the
/// body rendered as canonical JSON. Serializing the body cannot fail for
/// these record types.
pub fn compute_hash(block: &Block) -> String {
    let body = serde_json::to_string(&block.body).expect("transactions serialize to JSON");
    tripcoin_crypto::sha256_hex(
        format!(
            "{}{}{}{}{}",
            block.index, block.parent_hash, block.timestamp, body, block.nonce
        )
        .as_bytes(),
    )
}

/// Seal a proposed block: fill in the hash, then sign it.
///
/// The hash is computed first (with `signature == ""`) and is not
/// recomputed after the signature lands.
pub fn forge(block: &mut Block, keypair: &Keypair) {
    block.hash = compute_hash(block);
    block.signature = keypair.sign(block.hash.as_bytes()).to_hex();
}

/// The genesis block: height 0, parent `"0"`, forged by nobody.
pub fn genesis() -> Block {
    let mut block = Block {
        index: 0,
        timestamp: GENESIS_TIMESTAMP.to_string(),
        parent_hash: GENESIS_PARENT_HASH.to_string(),
        hash: String::new(),
        nonce: 0,
        validator: Address::system(),
        signature: String::new(),
        block_type: BlockType::CriticalProcess,
        body: Vec::new(),
        total_fees: 0,
    };
    block.hash = compute_hash(&block);
    block
}
