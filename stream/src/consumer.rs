//! The consumer worker loop.
//!
//! Each worker owns a stable consumer name inside the shared group. A
//! worker processes one batch at a time — there is never a second read
//! while a batch is in flight — and acknowledges each message only after
//! the handler succeeds. A handler failure leaves the message pending: it
//! is redelivered to the same consumer on restart, or claimed by a live
//! worker once it has sat idle long enough.

use {
    crate::{Result, GROUP_NAME, MESSAGE_FIELD, STREAM_NAME},
    async_trait::async_trait,
    log::{debug, info, warn},
    std::{sync::Arc, time::Duration},
    tokio::sync::watch,
    tripcoin_store::{ReadPosition, StreamBus, StreamEntry},
};

/// Tuning for a consumer worker.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum entries fetched per batch.
    pub batch_size: usize,
    /// How long a read blocks waiting for new entries.
    pub block: Duration,
    /// Pause between batches.
    pub poll_interval: Duration,
    /// Pending age at which another worker's entry may be claimed.
    pub claim_min_idle: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            block: Duration::from_millis(100),
            poll_interval: Duration::from_millis(50),
            claim_min_idle: Duration::from_secs(30),
        }
    }
}

/// What the consumer hands each delivered payload to.
///
/// `process` must be idempotent: at-least-once delivery means the same
/// payload can arrive again after a crash or claim.
#[async_trait]
pub trait QueuedHandler: Send + Sync {
    /// Apply one queued message. An `Err` leaves the message pending for
    /// redelivery; `Ok` acknowledges it.
    async fn process(&self, payload: &str) -> std::result::Result<(), String>;
}

/// One worker of the `consensus_processors` group.
pub struct StreamConsumer {
    bus: Arc<dyn StreamBus>,
    handler: Arc<dyn QueuedHandler>,
    consumer_name: String,
    config: ConsumerConfig,
}

impl StreamConsumer {
    pub fn new(
        bus: Arc<dyn StreamBus>,
        handler: Arc<dyn QueuedHandler>,
        consumer_name: impl Into<String>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            bus,
            handler,
            consumer_name: consumer_name.into(),
            config,
        }
    }

    /// Drive the consume loop until `shutdown` flips to `true`.
    ///
    /// On startup the worker first drains its own pending list — messages
    /// delivered before a crash but never acknowledged.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("stream consumer {} starting", self.consumer_name);
        self.drain_own_pending().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = self
                .bus
                .read_group(
                    STREAM_NAME,
                    GROUP_NAME,
                    &self.consumer_name,
                    self.config.batch_size,
                    self.config.block,
                    ReadPosition::New,
                )
                .await?;

            if batch.is_empty() {
                // Idle moment: pick up work stranded on dead consumers.
                let claimed = self
                    .bus
                    .claim_stale(
                        STREAM_NAME,
                        GROUP_NAME,
                        &self.consumer_name,
                        self.config.claim_min_idle,
                        self.config.batch_size,
                    )
                    .await?;
                if !claimed.is_empty() {
                    info!(
                        "consumer {} claimed {} stale entries",
                        self.consumer_name,
                        claimed.len()
                    );
                    self.process_batch(&claimed).await?;
                }
            } else {
                self.process_batch(&batch).await?;
            }

            // Bounded pause so the loop stays responsive to shutdown even
            // when the stream is hot.
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("stream consumer {} stopped", self.consumer_name);
        Ok(())
    }

    async fn drain_own_pending(&self) -> Result<()> {
        loop {
            let pending = self
                .bus
                .read_group(
                    STREAM_NAME,
                    GROUP_NAME,
                    &self.consumer_name,
                    self.config.batch_size,
                    Duration::ZERO,
                    ReadPosition::Pending,
                )
                .await?;
            if pending.is_empty() {
                return Ok(());
            }
            info!(
                "consumer {} redelivering {} pending entries from a prior run",
                self.consumer_name,
                pending.len()
            );
            // If a handler keeps failing the entry stays pending; bail out
            // of the drain rather than spinning on it forever.
            if !self.process_batch(&pending).await? {
                return Ok(());
            }
        }
    }

    /// Process a batch sequentially. Returns whether every entry was acked.
    async fn process_batch(&self, batch: &[StreamEntry]) -> Result<bool> {
        let mut all_acked = true;
        for entry in batch {
            let payload = match entry.field(MESSAGE_FIELD) {
                Some(p) => p,
                None => {
                    // Not a consensus payload; acknowledge so it never
                    // redelivers.
                    warn!("stream entry {} has no {MESSAGE_FIELD} field", entry.id);
                    self.bus.ack(STREAM_NAME, GROUP_NAME, entry.id).await?;
                    continue;
                }
            };
            match self.handler.process(payload).await {
                Ok(()) => {
                    debug!("consumer {} acked {}", self.consumer_name, entry.id);
                    self.bus.ack(STREAM_NAME, GROUP_NAME, entry.id).await?;
                }
                Err(reason) => {
                    warn!(
                        "consumer {} left {} pending: {reason}",
                        self.consumer_name, entry.id
                    );
                    all_acked = false;
                }
            }
        }
        Ok(all_acked)
    }
}
