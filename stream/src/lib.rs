//! The durable consensus-message pipeline.
//!
//! Every consensus message — inbound from peers or originated locally — is
//! appended to the `consensus_messages` stream and consumed through the
//! `consensus_processors` group. The stream is the only road into the
//! replica's state tables: ingress admission filters and enqueues, workers
//! consume and apply. Delivery is at-least-once; the replica's queued
//! handler is idempotent, so a redelivered message is a no-op.
//!
//! ```text
//!  ingress / local origin ──► append ──► consensus_messages
//!                                             │
//!                  worker 1..N ◄── read_group (consensus_processors)
//!                       │
//!                handler.process ──ok──► ack
//!                       │
//!                      err ──► left pending → redelivered / claimed
//! ```

pub mod consumer;

pub use consumer::{ConsumerConfig, QueuedHandler, StreamConsumer};

use tripcoin_store::{KvStore, StreamBus, StreamId};

/// The single consensus stream.
pub const STREAM_NAME: &str = "consensus_messages";

/// The single consumer group distributing work across replica workers.
pub const GROUP_NAME: &str = "consensus_processors";

/// Field under which the serialized message travels.
pub const MESSAGE_FIELD: &str = "message";

/// Errors from the stream pipeline.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Store(#[from] tripcoin_store::StoreError),
}

/// Convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Idempotently create the stream + group and record the existence marker.
pub async fn init_stream(bus: &dyn StreamBus, kv: &dyn KvStore) -> Result<()> {
    bus.create_group(STREAM_NAME, GROUP_NAME).await?;
    kv.set(&format!("stream-exists:{STREAM_NAME}"), "true")
        .await?;
    Ok(())
}

/// Append a serialized consensus message; returns after the durable write.
pub async fn enqueue(bus: &dyn StreamBus, payload: &str) -> Result<StreamId> {
    Ok(bus.append(STREAM_NAME, &[(MESSAGE_FIELD, payload)]).await?)
}
