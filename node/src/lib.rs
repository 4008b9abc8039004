//! The Tripcoin validator node.
//!
//! Wires the pure PBFT replica to its infrastructure: the durable store,
//! the consensus-message stream, the mempool, and the network gateway.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 NodeService                      │
//! │                                                  │
//! │  gateway inbound ──► ReplicaAdapter.deliver ──┐  │
//! │                                               ▼  │
//! │  stream workers ◄── consensus_messages ◄── enqueue│
//! │        │                                         │
//! │        ▼                                         │
//! │  ReplicaAdapter.process ──► Replica (pure)       │
//! │        │                                         │
//! │        ├── broadcast ──► Gateway                 │
//! │        └── finalize ──► BlockStore + ChainState  │
//! │                          + Mempool.remove        │
//! │                                                  │
//! │  timers: round 5s · registry 30s · sweep 60s     │
//! │          view-change poll 50ms                   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The replica depends on a [`Gateway`] capability supplied at
//! construction; the gateway glue depends on the adapter's deliver
//! methods. Neither imports the other.
//!
//! [`Gateway`]: gateway::Gateway

pub mod adapter;
pub mod builder;
pub mod config;
pub mod gateway;
pub mod registry;
pub mod service;

pub use adapter::ReplicaAdapter;
pub use builder::BlockBuilder;
pub use config::NodeConfig;
pub use gateway::{Gateway, NullGateway};
pub use service::{NodeHandle, NodeService};

/// Fatal node conditions. Any of these at startup exits the process
/// non-zero.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("signing key could not be loaded: {0}")]
    BadSigningKey(#[from] tripcoin_crypto::CryptoError),

    #[error("store failure: {0}")]
    Store(#[from] tripcoin_store::StoreError),

    #[error("stream failure: {0}")]
    Stream(#[from] tripcoin_stream::StreamError),

    #[error("key-value store is unreachable: {0}")]
    UnreachableKv(String),

    #[error("invalid consensus configuration: {0}")]
    BadConsensusConfig(#[from] tripcoin_consensus_pbft::config::ConfigError),

    #[error("invalid mempool configuration: {0}")]
    BadMempoolConfig(#[from] tripcoin_mempool::config::ConfigError),
}

/// Convenience result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
