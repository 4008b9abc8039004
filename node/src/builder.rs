//! Candidate-block assembly.
//!
//! When the round tick finds this replica primary, the builder turns the
//! mempool's highest-density picks into a forged block on top of the
//! current chain head.

use {
    std::sync::Arc,
    tripcoin_crypto::Keypair,
    tripcoin_ledger::{forge, now_timestamp, Block, BlockType, Transaction},
};

/// Assembles and forges candidate blocks for this validator.
pub struct BlockBuilder {
    keypair: Arc<Keypair>,
}

impl BlockBuilder {
    pub fn new(keypair: Arc<Keypair>) -> Self {
        Self { keypair }
    }

    /// Build a signed candidate extending `parent`.
    pub fn build(&self, parent: &Block, body: Vec<Transaction>) -> Block {
        let total_fees = body.iter().map(|tx| tx.fee).sum();
        let mut block = Block {
            index: parent.index + 1,
            timestamp: now_timestamp(),
            parent_hash: parent.hash.clone(),
            hash: String::new(),
            nonce: 0,
            validator: self.keypair.address(),
            signature: String::new(),
            block_type: BlockType::Transaction,
            body,
            total_fees,
        };
        forge(&mut block, &self.keypair);
        block
    }
}
