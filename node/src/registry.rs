//! Registry persistence: loading the validator set and registering the
//! local identity.
//!
//! The authoritative records live in the `validators` KV hash. Records
//! whose address does not match their public key are refused at load.
//! When the hash is empty (fresh deployment mid-sync), addresses can
//! still be extracted from recent finalized blocks for peer discovery,
//! but only records with registered public keys enter the snapshot —
//! signature verification is not negotiable.

use {
    crate::Result,
    log::{debug, info, warn},
    std::time::{SystemTime, UNIX_EPOCH},
    tripcoin_consensus_pbft::{ValidatorInfo, ValidatorSet, ValidatorStatus},
    tripcoin_crypto::Keypair,
    tripcoin_store::{BlockStore, KvStore},
};

const VALIDATORS: &str = "validators";

/// How many recent blocks the discovery fallback scans.
const RECENT_BLOCK_SCAN: usize = 50;

/// Default stake for a first-time self-registration.
const DEFAULT_STAKE: u64 = 100;

/// Wall-clock now in unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Load the active validator set from the durable store.
///
/// `view` and `view_horizon` stamp the returned snapshot for the
/// stale-view admission rules.
pub async fn load_validator_set(
    kv: &dyn KvStore,
    blocks: &BlockStore,
    view: u64,
    view_horizon: u64,
) -> Result<ValidatorSet> {
    let mut records = Vec::new();
    for (address, json) in kv.hgetall(VALIDATORS).await? {
        match serde_json::from_str::<ValidatorInfo>(&json) {
            Ok(record) if record.address_matches_key() => records.push(record),
            Ok(record) => warn!(
                "registry record {address} refused: address does not match public key {:#}",
                record.address
            ),
            Err(e) => warn!("registry record {address} is corrupt: {e}"),
        }
    }

    if records.is_empty() {
        // Discovery fallback: names without keys. These peers become
        // votable only once their registry records sync.
        let recent = blocks.get_recent_blocks(RECENT_BLOCK_SCAN).await?;
        let mut seen = std::collections::HashSet::new();
        for block in recent {
            if !block.validator.is_system() && seen.insert(block.validator.clone()) {
                debug!("discovered validator {:#} from recent blocks", block.validator);
            }
        }
        if !seen.is_empty() {
            warn!(
                "validators hash is empty; {} peers discovered from blocks but none \
                 have registered keys yet",
                seen.len()
            );
        }
    }

    Ok(ValidatorSet::new(records, view, view_horizon))
}

/// Upsert the local validator's record. Keeps an existing stake and
/// reputation; refreshes liveness and key material.
pub async fn register_self(kv: &dyn KvStore, keypair: &Keypair) -> Result<()> {
    let address = keypair.address();
    let (stake, reputation) = match kv.hget(VALIDATORS, address.as_str()).await? {
        Some(json) => serde_json::from_str::<ValidatorInfo>(&json)
            .map(|existing| (existing.stake, existing.reputation))
            .unwrap_or((DEFAULT_STAKE, 0)),
        None => (DEFAULT_STAKE, 0),
    };

    let record = ValidatorInfo {
        address: address.clone(),
        public_key: keypair.public_key(),
        stake,
        reputation,
        last_active: now_ms(),
        status: ValidatorStatus::Active,
    };
    kv.hset(
        VALIDATORS,
        address.as_str(),
        &serde_json::to_string(&record).map_err(tripcoin_store::StoreError::from)?,
    )
    .await?;
    info!("registered local validator {address:#} (stake {stake})");
    Ok(())
}
