//! Node configuration from the process environment.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `PORT` | Service port advertised to the gateway glue | 8080 |
//! | `REDIS_URL` | KV + stream endpoint | — (required) |
//! | `SEED_NODES` | CSV of seed URIs | empty |
//! | `GAS_PRICE` | Integer gas price | 10 |
//! | `BLOCK_REWARD` | Integer reward per finalized block | 50 |
//! | `SUPPLY_CAP` | Max total supply | 21,000,000 |
//! | `VALIDATOR_KEY_SEED` | 32-byte hex signing seed | generated |
//! | `CONSUMER_NAME` | Stable stream consumer name prefix | `<host>-<pid>` |
//! | `NODE_WORKERS` | Stream consumer workers | 2 |

use {
    crate::{NodeError, Result},
    std::env,
};

/// Validated node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port the external gateway glue binds for this node.
    pub port: u16,
    /// Endpoint of the durable KV + stream backend.
    pub store_url: String,
    /// Seed node URIs, used by the external admission glue.
    pub seed_nodes: Vec<String>,
    pub gas_price: u64,
    pub block_reward: u64,
    pub supply_cap: u64,
    /// Hex seed for a stable validator identity; a fresh identity is
    /// generated when absent.
    pub key_seed: Option<String>,
    /// Prefix for stream consumer names; workers append their index.
    pub consumer_name: String,
    /// Number of stream consumer workers.
    pub workers: usize,
}

impl NodeConfig {
    /// Read and validate configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let store_url = env::var("REDIS_URL").map_err(|_| NodeError::MissingEnv("REDIS_URL"))?;

        let port = parse_or("PORT", 8080)?;
        let gas_price = parse_or("GAS_PRICE", 10)?;
        let block_reward = parse_or("BLOCK_REWARD", 50)?;
        let supply_cap = parse_or("SUPPLY_CAP", 21_000_000)?;
        let workers = parse_or("NODE_WORKERS", 2)?;

        let seed_nodes = env::var("SEED_NODES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let key_seed = env::var("VALIDATOR_KEY_SEED").ok();

        let consumer_name = env::var("CONSUMER_NAME").unwrap_or_else(|_| {
            let host = env::var("HOSTNAME").unwrap_or_else(|_| "replica".to_string());
            format!("{host}-{}", std::process::id())
        });

        Ok(Self {
            port: port as u16,
            store_url,
            seed_nodes,
            gas_price,
            block_reward,
            supply_cap,
            key_seed,
            consumer_name,
            workers: workers.max(1) as usize,
        })
    }
}

fn parse_or(var: &'static str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| NodeError::InvalidEnv {
            var,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}
