//! The appendable-stream contract with consumer groups.
//!
//! Semantics follow the classic stream/consumer-group model: entries get a
//! server-assigned monotonic id on append; a consumer group holds a cursor
//! over the stream; every entry delivered to a consumer stays on that
//! consumer's pending list until acknowledged; un-acked entries are
//! redelivered to the same consumer on restart or claimed by another
//! consumer once sufficiently idle. Delivery is therefore at-least-once and
//! handlers must be idempotent.

use {
    crate::{Result, StoreError},
    async_trait::async_trait,
    parking_lot::Mutex,
    std::{
        collections::{BTreeMap, HashMap},
        fmt,
        sync::Arc,
        time::{Duration, Instant},
    },
    tokio::sync::Notify,
};

/// Server-assigned monotonic entry id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-0", self.0)
    }
}

/// One delivered stream entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    /// Fetch a field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPosition {
    /// Entries never delivered to any consumer in the group (`>`).
    New,
    /// This consumer's own pending (delivered, un-acked) entries (`0`).
    Pending,
}

/// The stream contract.
#[async_trait]
pub trait StreamBus: Send + Sync {
    /// Append an entry; returns after the write is durable.
    async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> Result<StreamId>;

    /// Create a consumer group at the stream head, creating the stream if
    /// absent. Idempotent: an existing group is not an error.
    async fn create_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Read up to `count` entries for `consumer`, blocking up to `block`
    /// when no new entries are available. Delivered entries become pending
    /// for the consumer until [`StreamBus::ack`].
    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
        position: ReadPosition,
    ) -> Result<Vec<StreamEntry>>;

    /// Acknowledge an entry, removing it from the group's pending list.
    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<()>;

    /// Reassign to `consumer` entries that have been pending on any
    /// consumer for longer than `min_idle`, returning them for processing.
    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>>;

    /// Number of entries in the stream.
    async fn stream_len(&self, stream: &str) -> Result<usize>;

    /// Number of pending (delivered, un-acked) entries across the group.
    async fn group_pending(&self, stream: &str, group: &str) -> Result<usize>;
}

// ── In-process engine ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u32,
}

#[derive(Default)]
struct GroupState {
    /// Index into `StreamState::entries` of the next never-delivered entry.
    cursor: usize,
    /// Pending entries keyed by sequence number.
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Default)]
struct StreamState {
    next_seq: u64,
    entries: Vec<StreamEntry>,
    groups: HashMap<String, GroupState>,
}

/// In-process [`StreamBus`] engine with full consumer-group semantics.
pub struct MemoryStream {
    streams: Mutex<HashMap<String, StreamState>>,
    /// Woken on every append so blocked group reads can retry.
    appended: Arc<Notify>,
}

impl Default for MemoryStream {
    fn default() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            appended: Arc::new(Notify::new()),
        }
    }
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// One non-blocking delivery attempt. Returns entries and records them
    /// as pending.
    fn try_read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        position: ReadPosition,
    ) -> Result<Vec<StreamEntry>> {
        let mut streams = self.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StoreError::UnknownStream(stream.to_string()))?;

        // Split borrow: the group table and the entry log.
        let entries = &state.entries;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::UnknownGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let now = Instant::now();
        match position {
            ReadPosition::New => {
                let mut delivered = Vec::new();
                while delivered.len() < count && group_state.cursor < entries.len() {
                    let entry = entries[group_state.cursor].clone();
                    group_state.pending.insert(
                        entry.id.0,
                        PendingEntry {
                            consumer: consumer.to_string(),
                            delivered_at: now,
                            delivery_count: 1,
                        },
                    );
                    delivered.push(entry);
                    group_state.cursor += 1;
                }
                Ok(delivered)
            }
            ReadPosition::Pending => {
                let seqs: Vec<u64> = group_state
                    .pending
                    .iter()
                    .filter(|(_, p)| p.consumer == consumer)
                    .map(|(seq, _)| *seq)
                    .take(count)
                    .collect();
                let mut delivered = Vec::new();
                for seq in seqs {
                    if let Some(p) = group_state.pending.get_mut(&seq) {
                        p.delivered_at = now;
                        p.delivery_count += 1;
                    }
                    if let Some(entry) = entries.iter().find(|e| e.id.0 == seq) {
                        delivered.push(entry.clone());
                    }
                }
                Ok(delivered)
            }
        }
    }
}

#[async_trait]
impl StreamBus for MemoryStream {
    async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> Result<StreamId> {
        let id = {
            let mut streams = self.streams.lock();
            let state = streams.entry(stream.to_string()).or_default();
            let id = StreamId(state.next_seq);
            state.next_seq += 1;
            state.entries.push(StreamEntry {
                id,
                fields: fields
                    .iter()
                    .map(|(f, v)| (f.to_string(), v.to_string()))
                    .collect(),
            });
            id
        };
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut streams = self.streams.lock();
        let state = streams.entry(stream.to_string()).or_default();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
        position: ReadPosition,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;
        loop {
            let notified = self.appended.notified();
            let delivered = self.try_read(stream, group, consumer, count, position)?;
            if !delivered.is_empty() || position == ReadPosition::Pending {
                return Ok(delivered);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            // Wait for an append (or the block window to lapse), then retry.
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: StreamId) -> Result<()> {
        let mut streams = self.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StoreError::UnknownStream(stream.to_string()))?;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::UnknownGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        group_state.pending.remove(&id.0);
        Ok(())
    }

    async fn claim_stale(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut streams = self.streams.lock();
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StoreError::UnknownStream(stream.to_string()))?;
        let entries = &state.entries;
        let group_state = state
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::UnknownGroup {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let now = Instant::now();
        let stale: Vec<u64> = group_state
            .pending
            .iter()
            .filter(|(_, p)| p.consumer != consumer && now.duration_since(p.delivered_at) >= min_idle)
            .map(|(seq, _)| *seq)
            .take(count)
            .collect();

        let mut claimed = Vec::new();
        for seq in stale {
            if let Some(p) = group_state.pending.get_mut(&seq) {
                p.consumer = consumer.to_string();
                p.delivered_at = now;
                p.delivery_count += 1;
            }
            if let Some(entry) = entries.iter().find(|e| e.id.0 == seq) {
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn stream_len(&self, stream: &str) -> Result<usize> {
        Ok(self
            .streams
            .lock()
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0))
    }

    async fn group_pending(&self, stream: &str, group: &str) -> Result<usize> {
        Ok(self
            .streams
            .lock()
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0))
    }
}
