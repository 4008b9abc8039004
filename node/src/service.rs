//! Node assembly and the long-lived task set.
//!
//! [`NodeService::start`] builds the whole stack — store, chain state,
//! stream, mempool, registry, replica, adapter — and spawns the
//! concurrent tasks of the node:
//!
//! 1. `workers` stream consumers draining `consensus_messages`.
//! 2. The round tick (5 s): leader proposals and parent-gap retries.
//! 3. The registry refresh (30 s).
//! 4. The mempool sweep (60 s).
//! 5. The view-timer poll (50 ms).
//!
//! Every task selects on one shutdown watch channel; flipping it stops
//! the node cleanly (in-flight acks drain, nothing new is read).

use {
    crate::{
        adapter::ReplicaAdapter,
        config::NodeConfig,
        gateway::{Gateway, NullGateway},
        registry, NodeError, Result,
    },
    log::{error, info},
    std::{sync::Arc, time::Duration},
    tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior},
    tripcoin_consensus_pbft::{PbftConfig, Replica},
    tripcoin_crypto::{Address, Keypair},
    tripcoin_mempool::{BalanceView, Mempool, MempoolConfig},
    tripcoin_monitoring::NodeMetrics,
    tripcoin_store::{BlockStore, ChainState},
};

/// Cadence of the view-timer poll.
const TIMER_POLL_MS: u64 = 50;

/// Balance lookups for mempool admission, served from chain state.
struct StateBalances(Arc<ChainState>);

impl BalanceView for StateBalances {
    fn balance(&self, address: &Address) -> u64 {
        self.0.balance(address)
    }
}

/// Builder for a running node.
pub struct NodeService;

/// A running node: its tasks and the switch that stops them.
pub struct NodeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    /// The adapter, exposed for the gateway glue's inbound deliveries.
    pub adapter: Arc<ReplicaAdapter>,
    /// Node metrics, exposed for the export surface.
    pub metrics: Arc<NodeMetrics>,
}

impl NodeHandle {
    /// Signal shutdown and wait for every task to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("node stopped");
    }
}

impl NodeService {
    /// Start a node with no network peers (single-node and test setups).
    pub async fn start(config: NodeConfig) -> Result<NodeHandle> {
        Self::start_with_gateway(config, Arc::new(NullGateway)).await
    }

    /// Start a node wired to the given gateway.
    pub async fn start_with_gateway(
        config: NodeConfig,
        gateway: Arc<dyn Gateway>,
    ) -> Result<NodeHandle> {
        let keypair = Arc::new(match &config.key_seed {
            Some(seed) => Keypair::from_seed_hex(seed)?,
            None => Keypair::generate(),
        });
        info!("validator identity: {:#}", keypair.address());

        let (kv, bus) = tripcoin_store::open(&config.store_url)?;
        let pong = kv
            .ping()
            .await
            .map_err(|e| NodeError::UnreachableKv(e.to_string()))?;
        if pong != "PONG" {
            return Err(NodeError::UnreachableKv(format!(
                "unexpected ping reply {pong:?}"
            )));
        }

        let blocks = Arc::new(BlockStore::new(kv.clone()));
        blocks.init_genesis().await?;
        let state = Arc::new(
            ChainState::load(kv.clone(), config.supply_cap, config.block_reward).await?,
        );
        tripcoin_stream::init_stream(bus.as_ref(), kv.as_ref()).await?;

        let pbft_config = PbftConfig::default();
        pbft_config.validate()?;
        let mempool_config = MempoolConfig {
            gas_price: config.gas_price,
            ..Default::default()
        };
        mempool_config.validate()?;
        let mempool = Arc::new(Mempool::new(
            mempool_config,
            Arc::new(StateBalances(state.clone())),
        ));

        registry::register_self(kv.as_ref(), &keypair).await?;
        let set = registry::load_validator_set(
            kv.as_ref(),
            &blocks,
            0,
            pbft_config.view_horizon,
        )
        .await?;
        info!(
            "validator set loaded: {} active, quorum {}",
            set.len(),
            set.quorum()
        );

        let mut replica = Replica::new(pbft_config.clone(), keypair.clone(), set);
        replica.bootstrap(blocks.get_chain_height().await?);

        let metrics = Arc::new(NodeMetrics::new());
        let adapter = ReplicaAdapter::new(
            replica,
            keypair,
            kv.clone(),
            blocks,
            state,
            mempool,
            bus.clone(),
            gateway,
            metrics.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // Stream consumer workers.
        for worker in 0..config.workers {
            let consumer = tripcoin_stream::StreamConsumer::new(
                bus.clone(),
                adapter.clone(),
                format!("{}-{worker}", config.consumer_name),
                tripcoin_stream::ConsumerConfig::default(),
            );
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = consumer.run(rx).await {
                    error!("stream consumer exited: {e}");
                }
            }));
        }

        // Round tick.
        {
            let adapter = adapter.clone();
            let mut rx = shutdown_rx.clone();
            let period = Duration::from_millis(pbft_config.round_interval_ms);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => adapter.tick_round().await,
                        _ = rx.changed() => if *rx.borrow() { break },
                    }
                }
            }));
        }

        // Registry refresh.
        {
            let adapter = adapter.clone();
            let mut rx = shutdown_rx.clone();
            let period = Duration::from_millis(pbft_config.registry_refresh_interval_ms);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => adapter.refresh_registry().await,
                        _ = rx.changed() => if *rx.borrow() { break },
                    }
                }
            }));
        }

        // Mempool sweep.
        {
            let adapter = adapter.clone();
            let mut rx = shutdown_rx.clone();
            let period = Duration::from_millis(pbft_config.mempool_sweep_interval_ms);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => adapter.sweep_mempool(),
                        _ = rx.changed() => if *rx.borrow() { break },
                    }
                }
            }));
        }

        // View-timer poll.
        {
            let adapter = adapter.clone();
            let mut rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(Duration::from_millis(TIMER_POLL_MS));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => adapter.poll_timers().await,
                        _ = rx.changed() => if *rx.borrow() { break },
                    }
                }
            }));
        }

        info!(
            "node started: {} stream workers, round every {}ms",
            config.workers, pbft_config.round_interval_ms
        );
        Ok(NodeHandle {
            shutdown: shutdown_tx,
            tasks,
            adapter,
            metrics,
        })
    }
}
