//! Account state and supply tracking.
//!
//! The replica treats execution as an opaque transition applied after
//! finalization: debit senders, credit recipients, route fees and the block
//! reward to the forging validator, capped by the total-supply ceiling.
//! Balance reads are served from an in-memory image so mempool admission
//! never suspends; writes go through to the KV layer.

use {
    crate::{KvStore, Result, StoreError},
    log::{info, warn},
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    std::{collections::BTreeMap, sync::Arc},
    tripcoin_crypto::Address,
    tripcoin_ledger::Block,
};

const STATE: &str = "blockchain:state";
const SUPPLY: &str = "tripcoin:supply";

/// The persisted state image under `blockchain:state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainStateData {
    pub balances: BTreeMap<String, u64>,
    pub nonces: BTreeMap<String, u64>,
    /// Contract records are carried opaquely; this node never interprets
    /// them.
    pub contracts: BTreeMap<String, serde_json::Value>,
}

/// Balances, nonces, and the minted-supply counter.
pub struct ChainState {
    kv: Arc<dyn KvStore>,
    data: RwLock<ChainStateData>,
    supply: RwLock<u64>,
    supply_cap: u64,
    block_reward: u64,
}

impl ChainState {
    /// Load (or default-initialize) state from the KV layer.
    pub async fn load(
        kv: Arc<dyn KvStore>,
        supply_cap: u64,
        block_reward: u64,
    ) -> Result<Self> {
        let data = match kv.get(STATE).await? {
            Some(json) => serde_json::from_str(&json).map_err(|e| StoreError::CorruptValue {
                key: STATE.to_string(),
                detail: e.to_string(),
            })?,
            None => ChainStateData::default(),
        };
        let supply = match kv.get(SUPPLY).await? {
            Some(raw) => raw.parse().map_err(|_| StoreError::CorruptValue {
                key: SUPPLY.to_string(),
                detail: format!("not an integer: {raw:?}"),
            })?,
            None => 0,
        };
        Ok(Self {
            kv,
            data: RwLock::new(data),
            supply: RwLock::new(supply),
            supply_cap,
            block_reward,
        })
    }

    /// Current balance of an account. Never suspends.
    pub fn balance(&self, address: &Address) -> u64 {
        self.data
            .read()
            .balances
            .get(address.as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Total minted supply.
    pub fn supply(&self) -> u64 {
        *self.supply.read()
    }

    /// Credit an account directly and persist. Used by genesis funding and
    /// test setup; consensus-path mutations go through [`apply_finalized`].
    ///
    /// [`apply_finalized`]: ChainState::apply_finalized
    pub async fn fund(&self, address: &Address, amount: u64) -> Result<()> {
        {
            let mut data = self.data.write();
            let balance = data.balances.entry(address.as_str().to_string()).or_insert(0);
            *balance = balance.saturating_add(amount);
        }
        self.persist().await
    }

    /// Apply a finalized block: transfers, fees, and (optionally) the block
    /// reward. Returns the amount of new supply minted.
    ///
    /// Reward distribution is suppressed while a view change is in flight;
    /// the caller passes that flag at the instant of finalization.
    pub async fn apply_finalized(&self, block: &Block, distribute_reward: bool) -> Result<u64> {
        let mut minted = 0;
        {
            let mut data = self.data.write();
            for tx in &block.body {
                let debit = tx.amount.saturating_add(tx.fee);
                let from_balance = data
                    .balances
                    .entry(tx.from.as_str().to_string())
                    .or_insert(0);
                if *from_balance < debit {
                    // A finalized block is authoritative; log the anomaly
                    // rather than rewinding consensus.
                    warn!(
                        "finalized tx {} overdraws {:#}: balance {} < {}",
                        tx.hash, tx.from, *from_balance, debit
                    );
                }
                *from_balance = from_balance.saturating_sub(debit);

                let to_balance = data.balances.entry(tx.to.as_str().to_string()).or_insert(0);
                *to_balance = to_balance.saturating_add(tx.amount);

                let nonce = data.nonces.entry(tx.from.as_str().to_string()).or_insert(0);
                *nonce += 1;
            }

            if !block.validator.is_system() {
                let mut credit = block.total_fees;
                if distribute_reward {
                    let mut supply = self.supply.write();
                    minted = self.block_reward.min(self.supply_cap.saturating_sub(*supply));
                    *supply += minted;
                    credit = credit.saturating_add(minted);
                }
                if credit > 0 {
                    let validator_balance = data
                        .balances
                        .entry(block.validator.as_str().to_string())
                        .or_insert(0);
                    *validator_balance = validator_balance.saturating_add(credit);
                }
            }
        }

        self.persist().await?;
        if minted > 0 {
            info!(
                "minted {minted} to {:#} at height {} (supply now {})",
                block.validator,
                block.index,
                self.supply()
            );
        }
        Ok(minted)
    }

    async fn persist(&self) -> Result<()> {
        let (state_json, supply) = {
            let data = self.data.read();
            (serde_json::to_string(&*data)?, *self.supply.read())
        };
        self.kv.set(STATE, &state_json).await?;
        self.kv.set(SUPPLY, &supply.to_string()).await?;
        Ok(())
    }
}
