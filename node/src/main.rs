//! The Tripcoin validator service binary.
//!
//! Reads configuration from the environment (see [`NodeConfig`]), starts
//! the node, and runs until interrupted. Exits non-zero on any fatal
//! initialization failure: missing configuration, bad signing keys, or an
//! unreachable key-value store.

use {
    log::{error, info},
    std::process::ExitCode,
    tripcoin_node::{NodeConfig, NodeService},
};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "tripcoin-node starting (port {}, store {})",
        config.port, config.store_url
    );

    let handle = match NodeService::start(config).await {
        Ok(handle) => handle,
        Err(e) => {
            error!("fatal init failure: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("could not wait for shutdown signal: {e}");
    }
    info!("shutdown signal received");
    handle.shutdown().await;
    ExitCode::SUCCESS
}
