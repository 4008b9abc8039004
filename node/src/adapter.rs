//! The replica adapter.
//!
//! Bridges the pure PBFT state machine with the validator's
//! infrastructure: block store, chain state, mempool, stream, and network
//! gateway. Two roads lead into the replica:
//!
//! - **Ingress** ([`deliver_consensus_message`]): admission screening,
//!   then a durable enqueue. No state-table mutation happens here.
//! - **Queued** ([`QueuedHandler::process`]): the stream workers apply
//!   table updates and quorum side effects. Handlers are idempotent, so
//!   at-least-once delivery is safe.
//!
//! Locking follows one rule everywhere: the replica mutex is held only
//! across table mutation and quorum checks; every broadcast, store, and
//! stream call happens after release.
//!
//! [`deliver_consensus_message`]: ReplicaAdapter::deliver_consensus_message

use {
    crate::{builder::BlockBuilder, gateway::Gateway, registry, Result},
    async_trait::async_trait,
    log::{debug, error, info, warn},
    parking_lot::Mutex,
    std::{
        collections::HashMap,
        sync::Arc,
        time::{Duration, Instant},
    },
    tripcoin_consensus_pbft::{
        BlockKey, ConsensusMessage, DropReason, PhaseMessage, Replica, ReplicaOutput, TimerDuty,
        ValidatorStatus, ViewChangeTick, ViewTimer,
    },
    tripcoin_crypto::{Address, Keypair},
    tripcoin_ledger::{verify_block, Block, Transaction, Verdict},
    tripcoin_mempool::{AdmissionError, Mempool},
    tripcoin_monitoring::NodeMetrics,
    tripcoin_store::{BlockStore, ChainState, KvStore, StreamBus},
    tripcoin_stream::QueuedHandler,
};

/// Attempts for a durable enqueue before the message is abandoned.
const ENQUEUE_RETRIES: u32 = 3;

/// Glue between the replica state machine and the node's I/O.
pub struct ReplicaAdapter {
    replica: Mutex<Replica>,
    timer: Mutex<ViewTimer>,
    keypair: Arc<Keypair>,
    kv: Arc<dyn KvStore>,
    blocks: Arc<BlockStore>,
    state: Arc<ChainState>,
    mempool: Arc<Mempool>,
    bus: Arc<dyn StreamBus>,
    gateway: Arc<dyn Gateway>,
    metrics: Arc<NodeMetrics>,
    builder: BlockBuilder,
    /// Serializes finalization so heights land strictly in order even with
    /// several stream workers.
    finalize_gate: tokio::sync::Mutex<()>,
    /// PRE-PREPAREs whose block (or its parent) is not yet local.
    parent_gaps: Mutex<HashMap<BlockKey, PhaseMessage>>,
    /// First-seen instants per block hash, for the finality histogram.
    proposed_at: Mutex<HashMap<String, Instant>>,
}

impl ReplicaAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        replica: Replica,
        keypair: Arc<Keypair>,
        kv: Arc<dyn KvStore>,
        blocks: Arc<BlockStore>,
        state: Arc<ChainState>,
        mempool: Arc<Mempool>,
        bus: Arc<dyn StreamBus>,
        gateway: Arc<dyn Gateway>,
        metrics: Arc<NodeMetrics>,
    ) -> Arc<Self> {
        let timeout = Duration::from_millis(replica.config().view_change_timeout_ms);
        let adapter = Arc::new(Self {
            replica: Mutex::new(replica),
            timer: Mutex::new(ViewTimer::new(timeout)),
            builder: BlockBuilder::new(keypair.clone()),
            keypair,
            kv,
            blocks,
            state,
            mempool,
            bus,
            gateway,
            metrics,
            finalize_gate: tokio::sync::Mutex::new(()),
            parent_gaps: Mutex::new(HashMap::new()),
            proposed_at: Mutex::new(HashMap::new()),
        });
        adapter.sync_timer();
        adapter
    }

    /// Run a closure against the replica under its lock. Diagnostics
    /// surface: callers must not block or suspend inside.
    pub fn inspect_replica<T>(&self, f: impl FnOnce(&Replica) -> T) -> T {
        f(&self.replica.lock())
    }

    // ── Gateway-inbound surface ─────────────────────────────────────────

    /// Ingress for consensus messages from peers: screen, then enqueue.
    /// Rejections are silent by design; the drop counters are the trace.
    pub async fn deliver_consensus_message(&self, message: ConsensusMessage) {
        let admitted = {
            let mut replica = self.replica.lock();
            replica.admit(&message, registry::now_ms())
        };
        match admitted {
            Ok(admitted) => {
                if admitted.from_current_leader {
                    self.timer.lock().reset();
                }
                self.enqueue(&message).await;
            }
            Err(reason) => self.count_drop(reason, &message),
        }
    }

    /// Ingress for proposed blocks: stash until consensus resolves them.
    pub async fn deliver_block_proposal(&self, block: Block) {
        self.proposed_at
            .lock()
            .entry(block.hash.clone())
            .or_insert_with(Instant::now);
        if let Err(e) = self.blocks.save_pending_block(&block).await {
            warn!("could not stash proposed block {}: {e}", block.hash);
        }
    }

    /// Transaction submission surface. Rejections carry a reason for the
    /// submitter and are never error-logged.
    pub fn submit_transaction(&self, tx: Transaction) -> std::result::Result<(), AdmissionError> {
        let before = self.mempool.len();
        let outcome = self.mempool.add(tx);
        match &outcome {
            Ok(()) => {
                self.metrics.mempool_admitted.inc();
                let after = self.mempool.len();
                // Admission at capacity sheds before inserting.
                if after <= before {
                    self.metrics
                        .mempool_shed
                        .add((before + 1 - after) as u64);
                }
                self.metrics.mempool_size.set(after as i64);
            }
            Err(_) => self.metrics.mempool_rejected.inc(),
        }
        outcome
    }

    // ── Timer-driven surface ────────────────────────────────────────────

    /// The 5-second round tick: parent-gap retries for everyone, a block
    /// proposal when this replica is the active primary.
    pub async fn tick_round(&self) {
        let (active, primary, view_changing, max_block_tx) = {
            let replica = self.replica.lock();
            (
                replica.registry().self_status(replica.local_address())
                    == ValidatorStatus::Active,
                replica.is_primary(),
                replica.is_view_changing(),
                replica.config().max_block_tx,
            )
        };
        if !active {
            return;
        }

        self.retry_parent_gaps().await;

        if !primary || view_changing {
            return;
        }

        let head = match self.blocks.get_head().await {
            Ok(Some(head)) => head,
            Ok(None) => {
                warn!("round tick: no chain head yet; skipping proposal");
                return;
            }
            Err(e) => {
                warn!("round tick: head lookup failed: {e}");
                return;
            }
        };

        let body = self.mempool.pick(max_block_tx);
        let block = self.builder.build(&head, body);
        if let Err(e) = self.blocks.save_pending_block(&block).await {
            warn!("round tick: could not persist candidate {}: {e}", block.hash);
            return;
        }
        self.proposed_at
            .lock()
            .insert(block.hash.clone(), Instant::now());

        info!(
            "proposing block {} at height {} ({} txs)",
            block.hash,
            block.index,
            block.body.len()
        );
        self.gateway.broadcast_block(&block).await;

        let pre_prepare = {
            let mut replica = self.replica.lock();
            replica.build_pre_prepare(block.index, &block.hash)
        };
        self.gateway.broadcast(&pre_prepare).await;
        self.enqueue(&pre_prepare).await;
        self.metrics.blocks_proposed.inc();
    }

    /// The 50-millisecond timer poll: leader-silence detection and
    /// view-change assembly progress.
    pub async fn poll_timers(&self) {
        let expired = self.timer.lock().expired();
        match expired {
            Some(TimerDuty::LeaderSilence) => {
                let output = {
                    let mut replica = self.replica.lock();
                    if replica.is_primary() {
                        None
                    } else {
                        Some(replica.start_view_change())
                    }
                };
                match output {
                    Some(output) => {
                        self.metrics.view_changes_started.inc();
                        self.timer.lock().arm(TimerDuty::ViewChangeAssembly);
                        if let Err(e) = self.apply_output(output).await {
                            warn!("view-change start: {e}");
                        }
                    }
                    None => self.timer.lock().cancel(),
                }
            }
            Some(TimerDuty::ViewChangeAssembly) => {
                let tick = {
                    let mut replica = self.replica.lock();
                    replica.view_change_timer_fired()
                };
                match tick {
                    ViewChangeTick::Completed { view, is_primary } => {
                        self.metrics.current_view.set(view as i64);
                        if is_primary {
                            self.timer.lock().cancel();
                            self.assume_leadership().await;
                        } else {
                            self.timer.lock().arm(TimerDuty::LeaderSilence);
                        }
                    }
                    ViewChangeTick::Escalated { target, output } => {
                        debug!("view change escalated toward view {target}");
                        self.metrics.view_change_escalations.inc();
                        self.timer.lock().arm(TimerDuty::ViewChangeAssembly);
                        if let Err(e) = self.apply_output(output).await {
                            warn!("view-change escalation: {e}");
                        }
                    }
                    ViewChangeTick::Idle => self.timer.lock().cancel(),
                }
            }
            None => self.sync_timer(),
        }
    }

    /// The 30-second registry refresh: re-register the local identity and
    /// reload the snapshot from the durable store.
    pub async fn refresh_registry(&self) {
        if let Err(e) = registry::register_self(self.kv.as_ref(), &self.keypair).await {
            warn!("self-registration failed: {e}");
        }

        let (view, horizon, heartbeat_ms) = {
            let replica = self.replica.lock();
            (
                replica.current_view(),
                replica.config().view_horizon,
                replica.config().heartbeat_interval_ms,
            )
        };
        match registry::load_validator_set(self.kv.as_ref(), &self.blocks, view, horizon).await {
            Ok(set) => {
                let now = registry::now_ms();
                for validator in set.iter() {
                    let silent_ms = now.saturating_sub(validator.last_active);
                    if validator.last_active > 0 && silent_ms > heartbeat_ms {
                        debug!(
                            "validator {:#} silent for {silent_ms}ms",
                            validator.address
                        );
                    }
                }
                let mut replica = self.replica.lock();
                replica.update_registry(set);
            }
            Err(e) => warn!("registry refresh failed: {e}"),
        }
        self.sync_timer();
    }

    /// The 60-second mempool sweep.
    pub fn sweep_mempool(&self) {
        let swept = self.mempool.sweep();
        self.metrics.mempool_swept.add(swept as u64);
        self.metrics.mempool_size.set(self.mempool.len() as i64);
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// A fresh primary after a completed view change: emit NEW_VIEW and
    /// re-propose every pending block in ascending order.
    async fn assume_leadership(&self) {
        let last_executed = { self.replica.lock().last_executed() };
        let pending = match self.blocks.get_pending_blocks(last_executed + 1).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("could not load pending blocks for NEW_VIEW: {e}");
                Vec::new()
            }
        };
        let keys: Vec<BlockKey> = pending
            .iter()
            .map(|b| BlockKey::new(b.index, b.hash.clone()))
            .collect();
        info!(
            "assuming leadership with {} pending blocks to re-propose",
            keys.len()
        );

        let output = {
            let mut replica = self.replica.lock();
            replica.build_new_view(&keys)
        };
        if let Err(e) = self.apply_output(output).await {
            warn!("NEW_VIEW emission: {e}");
        }
    }

    /// Re-attempt buffered PRE-PREPAREs whose block data may have arrived.
    async fn retry_parent_gaps(&self) {
        let buffered: Vec<(BlockKey, PhaseMessage)> = self
            .parent_gaps
            .lock()
            .iter()
            .map(|(k, m)| (k.clone(), m.clone()))
            .collect();

        for (key, message) in buffered {
            match self.authenticate(&message).await {
                Ok(Verdict::UnknownParent) => {} // still waiting
                Ok(verdict) => {
                    self.parent_gaps.lock().remove(&key);
                    let output = {
                        let mut replica = self.replica.lock();
                        replica.handle_pre_prepare(message, verdict)
                    };
                    if let Err(e) = self.apply_output(output).await {
                        warn!("parent-gap retry for {key}: {e}");
                    }
                }
                Err(e) => warn!("parent-gap retry for {key}: {e}"),
            }
        }
    }

    /// Resolve the block a PRE-PREPARE references and authenticate it
    /// against its parent. A block that has not arrived yet reports
    /// `UnknownParent` so the caller buffers and retries.
    async fn authenticate(
        &self,
        message: &PhaseMessage,
    ) -> tripcoin_store::Result<Verdict> {
        let block = match self.blocks.get_pending_block(&message.block_hash).await? {
            Some(block) => Some(block),
            None => self.blocks.get_block_by_hash(&message.block_hash).await?,
        };
        let block = match block {
            Some(block) => block,
            None => {
                debug!("block {} not yet local", message.block_hash);
                return Ok(Verdict::UnknownParent);
            }
        };

        let parent = if message.block_height == 0 {
            None
        } else {
            self.blocks
                .get_block_by_height(message.block_height - 1)
                .await?
        };

        let set = { self.replica.lock().registry().clone() };
        let keys = move |address: &Address| set.public_key_of(address);
        Ok(verify_block(&block, parent.as_ref(), &keys))
    }

    /// Execute a handler's requested side effects. An `Err` propagates to
    /// the stream worker, which leaves the message pending for retry.
    async fn apply_output(&self, output: ReplicaOutput) -> Result<()> {
        for message in output.broadcast {
            self.gateway.broadcast(&message).await;
            self.enqueue(&message).await;
        }

        if let Some(view) = output.adopted_view {
            self.metrics.current_view.set(view as i64);
            self.sync_timer();
        }

        for replayed in output.replay {
            self.deliver_consensus_message(replayed).await;
        }

        if let Some(key) = output.parent_gap {
            self.metrics.parent_gap_buffered.inc();
            debug!("buffered {key} awaiting parent data");
        }

        if let Some(key) = output.finalize {
            self.finalize_block(&key).await?;
        }
        Ok(())
    }

    /// Finalize `(height, hash)`: authenticate against the parent, persist,
    /// apply state, tear down round tables, drain the mempool.
    ///
    /// Store failures abort before any state mutation — a partial
    /// finalization never happens; the pending stream entry retries it.
    async fn finalize_block(&self, key: &BlockKey) -> Result<()> {
        let _gate = self.finalize_gate.lock().await;

        if self.replica.lock().last_executed() >= key.height {
            return Ok(()); // a sibling worker already finalized this height
        }

        let block = match self.blocks.get_pending_block(&key.hash).await? {
            Some(block) => Some(block),
            None => self.blocks.get_block_by_hash(&key.hash).await?,
        };
        let block = match block {
            Some(block) => block,
            None => {
                error!("finalize {key}: committed block is not in the store; aborting round");
                self.metrics.finalize_aborts.inc();
                return Ok(());
            }
        };

        let parent = if key.height == 0 {
            None
        } else {
            self.blocks.get_block_by_height(key.height - 1).await?
        };
        let set = { self.replica.lock().registry().clone() };
        let keys = move |address: &Address| set.public_key_of(address);
        match verify_block(&block, parent.as_ref(), &keys) {
            Verdict::Accepted => {}
            Verdict::UnknownParent => {
                warn!("finalize {key}: parent not local yet; deferring");
                self.metrics.finalize_aborts.inc();
                return Ok(());
            }
            Verdict::Rejected(reason) => {
                error!("finalize {key}: block fails authentication ({reason}); refusing");
                self.metrics.finalize_aborts.inc();
                return Ok(());
            }
        }

        self.blocks.save_block(&block).await?;

        let distribute_reward = { !self.replica.lock().is_view_changing() };
        self.state.apply_finalized(&block, distribute_reward).await?;

        {
            let mut replica = self.replica.lock();
            replica.complete_finalize(key);
        }
        if let Err(e) = self.blocks.remove_pending_block(&key.hash).await {
            debug!("pending cleanup for {key}: {e}");
        }

        self.mempool
            .remove(block.body.iter().map(|tx| tx.hash.as_str()));

        self.metrics.blocks_finalized.inc();
        self.metrics.chain_height.set(key.height as i64);
        self.metrics.mempool_size.set(self.mempool.len() as i64);
        if let Some(seen) = self.proposed_at.lock().remove(&key.hash) {
            self.metrics
                .finality_time_ms
                .observe(seen.elapsed().as_millis() as f64);
        }

        info!(
            "finalized block {} at height {} ({} txs, reward {})",
            key.hash,
            key.height,
            block.body.len(),
            if distribute_reward { "paid" } else { "withheld" }
        );
        Ok(())
    }

    /// Durably append a message to the consensus stream, with bounded
    /// retry.
    async fn enqueue(&self, message: &ConsensusMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("unserializable consensus message: {e}");
                return;
            }
        };
        for attempt in 1..=ENQUEUE_RETRIES {
            match tripcoin_stream::enqueue(self.bus.as_ref(), &payload).await {
                Ok(_) => {
                    self.metrics.stream_enqueued.inc();
                    return;
                }
                Err(e) if attempt < ENQUEUE_RETRIES => {
                    warn!("enqueue attempt {attempt} failed: {e}");
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => error!("dropping {} after {attempt} enqueue attempts: {e}", message.kind()),
            }
        }
    }

    /// Keep the view timer aligned with the replica's role.
    fn sync_timer(&self) {
        let (primary, view_changing) = {
            let replica = self.replica.lock();
            (replica.is_primary(), replica.is_view_changing())
        };
        let mut timer = self.timer.lock();
        if view_changing {
            if timer.duty() != Some(TimerDuty::ViewChangeAssembly) {
                timer.arm(TimerDuty::ViewChangeAssembly);
            }
        } else if primary {
            timer.cancel();
        } else if timer.duty() != Some(TimerDuty::LeaderSilence) {
            timer.arm(TimerDuty::LeaderSilence);
        }
    }

    fn count_drop(&self, reason: DropReason, message: &ConsensusMessage) {
        debug!(
            "dropped {} from {:#}: {reason}",
            message.kind(),
            message.validator()
        );
        let counter = match reason {
            DropReason::UnknownValidator => &self.metrics.dropped_unknown_validator,
            DropReason::BadSignature => &self.metrics.dropped_bad_signature,
            DropReason::StaleView => &self.metrics.dropped_stale_view,
            DropReason::StaleHeight => &self.metrics.dropped_stale_height,
            DropReason::ViewBeyondHorizon => &self.metrics.dropped_view_horizon,
            DropReason::NotLeader => &self.metrics.dropped_not_leader,
            DropReason::Duplicate => &self.metrics.dropped_duplicate,
        };
        counter.inc();
    }
}

#[async_trait]
impl QueuedHandler for ReplicaAdapter {
    /// The post-queue entrypoint. Never re-enqueues or re-broadcasts the
    /// consumed message; only table updates and quorum-crossing side
    /// effects happen here.
    async fn process(&self, payload: &str) -> std::result::Result<(), String> {
        let message: ConsensusMessage = match serde_json::from_str(payload) {
            Ok(message) => message,
            Err(e) => {
                // Admission signed off on this payload once; if it no
                // longer parses the entry is poison, not retryable.
                warn!("unparseable queued payload dropped: {e}");
                return Ok(());
            }
        };

        let output = match message {
            ConsensusMessage::PrePrepare(m) => {
                let verdict = self
                    .authenticate(&m)
                    .await
                    .map_err(|e| format!("store failure during authentication: {e}"))?;
                let output = {
                    let mut replica = self.replica.lock();
                    replica.handle_pre_prepare(m.clone(), verdict)
                };
                if output.parent_gap.is_some() {
                    self.parent_gaps.lock().insert(m.key(), m);
                }
                output
            }
            ConsensusMessage::Prepare(m) => {
                let mut replica = self.replica.lock();
                replica.handle_prepare(m)
            }
            ConsensusMessage::Commit(m) => {
                let mut replica = self.replica.lock();
                replica.handle_commit(m)
            }
            ConsensusMessage::ViewChange(m) => {
                let output = {
                    let mut replica = self.replica.lock();
                    let was_changing = replica.is_view_changing();
                    let output = replica.handle_view_change(m);
                    if !was_changing && replica.is_view_changing() {
                        self.metrics.view_changes_started.inc();
                    }
                    output
                };
                self.sync_timer();
                output
            }
            ConsensusMessage::NewView(m) => {
                let output = {
                    let mut replica = self.replica.lock();
                    replica.handle_new_view(m)
                };
                self.sync_timer();
                output
            }
        };

        self.apply_output(output).await.map_err(|e| e.to_string())?;
        self.metrics.stream_acked.inc();
        Ok(())
    }
}
