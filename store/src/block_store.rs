//! Chain-facing persistence over the KV contract.
//!
//! All keys follow the fixed layout documented at the crate root. Block
//! writes are idempotent on `(height, hash)`: re-saving the same block is a
//! no-op, saving a different block at an occupied height is refused — that
//! refusal is the store-side half of the one-block-per-height invariant.

use {
    crate::{KvStore, Result, StoreError},
    log::{debug, info},
    serde::{Deserialize, Serialize},
    std::sync::Arc,
    tripcoin_ledger::Block,
};

const BLOCKS: &str = "blockchain:blocks";
const HEIGHT: &str = "blockchain:height";
const TX_INDEX: &str = "blockchain:tx-index";
const SNAPSHOTS: &str = "blockchain:snapshots";
const PENDING: &str = "blockchain:pending-blocks";

/// A chain snapshot is cut every this many blocks.
pub const SNAPSHOT_INTERVAL: u64 = 1_000;

fn height_key(height: u64) -> String {
    format!("blockchain:height:{height}")
}

/// Periodic chain checkpoint, stored under `blockchain:snapshots`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub height: u64,
    pub block_hash: String,
}

/// Block persistence API required by the consensus replica.
pub struct BlockStore {
    kv: Arc<dyn KvStore>,
}

impl BlockStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Write the genesis block if the chain is empty. Idempotent.
    pub async fn init_genesis(&self) -> Result<()> {
        if self.kv.get(HEIGHT).await?.is_none() {
            let genesis = tripcoin_ledger::genesis();
            info!("initializing empty chain with genesis {}", genesis.hash);
            self.write_block(&genesis).await?;
            self.kv.set(HEIGHT, "0").await?;
        }
        Ok(())
    }

    pub async fn get_block_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        match self.kv.hget(BLOCKS, hash).await? {
            Some(json) => Ok(Some(parse_block(BLOCKS, &json)?)),
            None => Ok(None),
        }
    }

    pub async fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        match self.kv.get(&height_key(height)).await? {
            Some(hash) => self.get_block_by_hash(&hash).await,
            None => Ok(None),
        }
    }

    /// Latest finalized height; 0 for a chain holding only genesis.
    pub async fn get_chain_height(&self) -> Result<u64> {
        match self.kv.get(HEIGHT).await? {
            Some(raw) => raw.parse().map_err(|_| StoreError::CorruptValue {
                key: HEIGHT.to_string(),
                detail: format!("not an integer: {raw:?}"),
            }),
            None => Ok(0),
        }
    }

    /// The block at the chain head.
    pub async fn get_head(&self) -> Result<Option<Block>> {
        let height = self.get_chain_height().await?;
        self.get_block_by_height(height).await
    }

    /// Persist a finalized block. Idempotent on `(height, hash)`.
    pub async fn save_block(&self, block: &Block) -> Result<()> {
        if let Some(existing) = self.kv.get(&height_key(block.index)).await? {
            if existing == block.hash {
                debug!("block {} at height {} already saved", block.hash, block.index);
                return Ok(());
            }
            return Err(StoreError::ConflictingBlock {
                height: block.index,
                existing,
                offered: block.hash.clone(),
            });
        }

        self.write_block(block).await?;

        let current = self.get_chain_height().await?;
        if block.index > current {
            self.kv.set(HEIGHT, &block.index.to_string()).await?;
        }

        if block.index > 0 && block.index % SNAPSHOT_INTERVAL == 0 {
            let snapshot = Snapshot {
                height: block.index,
                block_hash: block.hash.clone(),
            };
            self.kv
                .hset(
                    SNAPSHOTS,
                    &block.index.to_string(),
                    &serde_json::to_string(&snapshot)?,
                )
                .await?;
            info!("chain snapshot cut at height {}", block.index);
        }
        Ok(())
    }

    /// Blocks awaiting consensus, at or above `from_height`, ascending.
    pub async fn get_pending_blocks(&self, from_height: u64) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for (_, json) in self.kv.hgetall(PENDING).await? {
            let block = parse_block(PENDING, &json)?;
            if block.index >= from_height {
                blocks.push(block);
            }
        }
        blocks.sort_by_key(|b| b.index);
        Ok(blocks)
    }

    /// The most recent `n` finalized blocks, newest first.
    pub async fn get_recent_blocks(&self, n: usize) -> Result<Vec<Block>> {
        let mut blocks = Vec::with_capacity(n);
        let mut height = self.get_chain_height().await?;
        loop {
            if blocks.len() >= n {
                break;
            }
            if let Some(block) = self.get_block_by_height(height).await? {
                blocks.push(block);
            }
            if height == 0 {
                break;
            }
            height -= 1;
        }
        Ok(blocks)
    }

    /// Stash a proposed block until consensus resolves it.
    pub async fn save_pending_block(&self, block: &Block) -> Result<()> {
        self.kv
            .hset(PENDING, &block.hash, &serde_json::to_string(block)?)
            .await
    }

    pub async fn get_pending_block(&self, hash: &str) -> Result<Option<Block>> {
        match self.kv.hget(PENDING, hash).await? {
            Some(json) => Ok(Some(parse_block(PENDING, &json)?)),
            None => Ok(None),
        }
    }

    pub async fn remove_pending_block(&self, hash: &str) -> Result<()> {
        self.kv.hdel(PENDING, hash).await
    }

    /// Unconditional write of block record + height index + tx index.
    async fn write_block(&self, block: &Block) -> Result<()> {
        self.kv
            .hset(BLOCKS, &block.hash, &serde_json::to_string(block)?)
            .await?;
        self.kv.set(&height_key(block.index), &block.hash).await?;
        for tx in &block.body {
            self.kv.hset(TX_INDEX, &tx.hash, &block.hash).await?;
        }
        Ok(())
    }
}

fn parse_block(key: &str, json: &str) -> Result<Block> {
    serde_json::from_str(json).map_err(|e| StoreError::CorruptValue {
        key: key.to_string(),
        detail: e.to_string(),
    })
}
