//! Durable storage contracts for the Tripcoin validator.
//!
//! The production key-value server lives outside this repository; what the
//! node depends on is the contract, not the server. This crate defines:
//!
//! - [`KvStore`] — a durable map with string values and hash fields.
//! - [`StreamBus`] — an appendable stream with consumer groups, pending
//!   lists, acknowledgement, and stale-entry claim.
//! - [`BlockStore`] — the chain-facing API layered on [`KvStore`] using the
//!   fixed key layout below.
//! - [`ChainState`] — balances/nonces/contracts applied as an opaque
//!   transition after finalization, plus supply-capped reward minting.
//!
//! An in-process engine ([`MemoryKv`], [`MemoryStream`]) backs the
//! `memory://` scheme; it implements the full contract including
//! consumer-group redelivery so every consumer can be exercised without a
//! server.
//!
//! # Key layout (fixed; changing any of these is a breaking migration)
//!
//! ```text
//! blockchain:blocks            hash → JSON(Block)
//! blockchain:height            "<latest height>"
//! blockchain:height:<h>        hash at height h
//! blockchain:tx-index          processId → block hash
//! blockchain:snapshots         "<h>" → JSON(Snapshot)   every 1000 blocks
//! blockchain:pending-blocks    hash → JSON(Block)
//! blockchain:state             JSON({balances, nonces, contracts})
//! validators                   address → JSON(ValidatorInfo)
//! validatorPeers               peerId  → peer address
//! tripcoin:supply              "<integer supply>"
//! stream-exists:<name>         "true"
//! ```

pub mod block_store;
pub mod chain_state;
pub mod kv;
pub mod stream;

pub use block_store::{BlockStore, Snapshot};
pub use chain_state::{ChainState, ChainStateData};
pub use kv::{KvStore, MemoryKv};
pub use stream::{MemoryStream, ReadPosition, StreamBus, StreamEntry, StreamId};

use std::sync::Arc;

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt stored value under {key}: {detail}")]
    CorruptValue { key: String, detail: String },

    /// A different block is already finalized at this height. Saving is
    /// idempotent on `(height, hash)` and conflicting writes are refused.
    #[error("conflicting block at height {height}: {existing} != {offered}")]
    ConflictingBlock {
        height: u64,
        existing: String,
        offered: String,
    },

    #[error("unknown stream {0}")]
    UnknownStream(String),

    #[error("unknown consumer group {group} on stream {stream}")]
    UnknownGroup { stream: String, group: String },

    #[error("unsupported store scheme in {0:?}; the external KV adapter plugs in here")]
    UnsupportedScheme(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Convenience result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Resolve a store endpoint into KV + stream handles.
///
/// The `memory://` scheme selects the in-process engine. Any other scheme
/// is refused at startup — the production adapter is provisioned outside
/// this repository and wired through the same traits.
pub fn open(url: &str) -> Result<(Arc<dyn KvStore>, Arc<dyn StreamBus>)> {
    match url.split_once("://") {
        Some(("memory", _)) => Ok((
            Arc::new(MemoryKv::new()),
            Arc::new(MemoryStream::new()),
        )),
        _ => Err(StoreError::UnsupportedScheme(url.to_string())),
    }
}
