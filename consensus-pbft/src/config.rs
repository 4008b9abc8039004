//! PBFT replica configuration.
//!
//! Timing parameters for the round loop, view-change failure detection,
//! and the background maintenance cadence. All intervals are in
//! milliseconds.

/// Configuration for the PBFT replica and its driving timers.
#[derive(Debug, Clone)]
pub struct PbftConfig {
    /// Leader proposal tick. Every interval, an ACTIVE primary proposes a
    /// block from the mempool. Default: 5000.
    pub round_interval_ms: u64,

    /// Leader-silence tolerance. When the current leader has been quiet for
    /// this long on a non-primary replica, the view-change path starts.
    /// The same duration paces the view-change assembly (secondary) timer.
    /// Default: 10_000.
    pub view_change_timeout_ms: u64,

    /// Expected heartbeat cadence from each peer; peers silent for longer
    /// get their liveness flagged in the registry. Default: 30_000.
    pub heartbeat_interval_ms: u64,

    /// Registry refresh cadence from the durable store. Default: 30_000.
    pub registry_refresh_interval_ms: u64,

    /// Mempool sweep cadence. Default: 60_000.
    pub mempool_sweep_interval_ms: u64,

    /// Highest acceptable message view relative to the registry snapshot's
    /// view. Messages tagged beyond `snapshot_view + view_horizon` are
    /// dropped until a refresh catches the snapshot up. Default: 100.
    pub view_horizon: u64,

    /// Maximum transactions picked from the mempool per proposed block.
    /// Default: 500.
    pub max_block_tx: usize,
}

impl Default for PbftConfig {
    fn default() -> Self {
        Self {
            round_interval_ms: 5_000,
            view_change_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            registry_refresh_interval_ms: 30_000,
            mempool_sweep_interval_ms: 60_000,
            view_horizon: 100,
            max_block_tx: 500,
        }
    }
}

impl PbftConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.round_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("round_interval_ms"));
        }
        if self.view_change_timeout_ms == 0 {
            return Err(ConfigError::ZeroInterval("view_change_timeout_ms"));
        }
        if self.max_block_tx == 0 {
            return Err(ConfigError::ZeroBlockCapacity);
        }
        Ok(())
    }
}

/// Errors in PBFT configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be > 0")]
    ZeroInterval(&'static str),
    #[error("max_block_tx must be > 0")]
    ZeroBlockCapacity,
}
