//! Mempool tunables.

use std::time::Duration;

/// Configuration for the pending-transaction pool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Hard cap on pool entries. Admission above this triggers shedding.
    /// Default: 5000.
    pub max_size: usize,

    /// Entries older than this are removed by the scheduled sweep.
    /// Default: 72 hours.
    pub max_tx_age: Duration,

    /// Gas price used to derive every fee: `fee = gas_limit × gas_price`.
    /// The wire fee is never trusted. Default: 10.
    pub gas_price: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5_000,
            max_tx_age: Duration::from_secs(72 * 60 * 60),
            gas_price: 10,
        }
    }
}

impl MempoolConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.gas_price == 0 {
            return Err(ConfigError::ZeroGasPrice);
        }
        Ok(())
    }
}

/// Errors in mempool configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("max_size must be > 0")]
    ZeroCapacity,
    #[error("gas_price must be > 0")]
    ZeroGasPrice,
}
