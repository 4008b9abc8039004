//! # Tripcoin Monitoring
//!
//! Metric instruments for the validator node, and a snapshot model the
//! exporter renders from.
//!
//! The design is descriptor-driven: instruments ([`Counter`], [`Gauge`],
//! [`Histogram`]) carry no names of their own. [`NodeMetrics::snapshot`]
//! folds every instrument into a flat list of [`Sample`]s — name, help
//! text, and a typed [`Observation`] — and the `prometheus` module renders
//! that list generically. Adding a metric means adding one field and one
//! line in `snapshot`; nothing else changes.
//!
//! Every silent protocol drop has a counter here — dropped messages are
//! invisible by design, so the counters are the only way to see them.
//!
//! ## Usage
//!
//! ```rust
//! use tripcoin_monitoring::NodeMetrics;
//!
//! let metrics = NodeMetrics::new();
//! metrics.blocks_finalized.inc();
//! metrics.finality_time_ms.observe(1200.0);
//! metrics.mempool_size.set(42);
//!
//! let text = tripcoin_monitoring::prometheus::encode(&metrics.snapshot());
//! ```

pub mod prometheus;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// ---------------------------------------------------------------------------
// Snapshot model
// ---------------------------------------------------------------------------

/// The typed value an instrument reports at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Monotonically increasing total.
    Counter(u64),
    /// Level that moves both ways.
    Gauge(i64),
    /// Distribution: cumulative `(upper bound, count ≤ bound)` pairs, the
    /// sum of all observations, and their total count.
    Histogram {
        buckets: Vec<(f64, u64)>,
        sum: f64,
        count: u64,
    },
}

/// One exported metric: descriptor plus current value.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: &'static str,
    pub help: &'static str,
    pub value: Observation,
}

// ---------------------------------------------------------------------------
// Instruments
// ---------------------------------------------------------------------------

/// A monotonically increasing counter.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, v: u64) {
        self.0.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A level that can rise and fall.
#[derive(Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn set(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A fixed-bound histogram.
///
/// Observations are tallied per bucket (each lands in the first bound that
/// holds it, or only in the implicit `+Inf` total when none does); the
/// cumulative view Prometheus expects is computed when the snapshot is
/// taken, not on the hot path.
pub struct Histogram {
    bounds: &'static [f64],
    state: Mutex<HistogramState>,
}

struct HistogramState {
    hits: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    pub fn new(bounds: &'static [f64]) -> Self {
        Self {
            bounds,
            state: Mutex::new(HistogramState {
                hits: vec![0; bounds.len()],
                sum: 0.0,
                count: 0,
            }),
        }
    }

    /// Record one observation.
    pub fn observe(&self, v: f64) {
        let mut state = self.state.lock();
        state.sum += v;
        state.count += 1;
        if let Some(slot) = self.bounds.iter().position(|bound| v <= *bound) {
            state.hits[slot] += 1;
        }
    }

    /// The cumulative snapshot value.
    pub fn observation(&self) -> Observation {
        let state = self.state.lock();
        let mut below = 0;
        let buckets = self
            .bounds
            .iter()
            .zip(&state.hits)
            .map(|(bound, hits)| {
                below += hits;
                (*bound, below)
            })
            .collect();
        Observation::Histogram {
            buckets,
            sum: state.sum,
            count: state.count,
        }
    }
}

// ---------------------------------------------------------------------------
// The node metric set
// ---------------------------------------------------------------------------

/// Bucket bounds for proposal-to-finalization latency, in milliseconds.
static FINALITY_BUCKETS_MS: [f64; 8] = [
    100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0,
];

/// Every instrument the validator node records into.
pub struct NodeMetrics {
    // Consensus progress
    pub blocks_finalized: Counter,
    pub blocks_proposed: Counter,
    pub view_changes_started: Counter,
    pub view_change_escalations: Counter,
    pub finality_time_ms: Histogram,
    pub current_view: Gauge,
    pub chain_height: Gauge,

    // Silent protocol drops
    pub dropped_unknown_validator: Counter,
    pub dropped_bad_signature: Counter,
    pub dropped_stale_view: Counter,
    pub dropped_stale_height: Counter,
    pub dropped_view_horizon: Counter,
    pub dropped_not_leader: Counter,
    pub dropped_duplicate: Counter,

    // Recovery paths
    pub parent_gap_buffered: Counter,
    pub finalize_aborts: Counter,
    pub conflicting_votes: Counter,

    // Mempool
    pub mempool_size: Gauge,
    pub mempool_admitted: Counter,
    pub mempool_rejected: Counter,
    pub mempool_shed: Counter,
    pub mempool_swept: Counter,

    // Stream pipeline
    pub stream_enqueued: Counter,
    pub stream_acked: Counter,
    pub stream_pending: Gauge,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self {
            blocks_finalized: Counter::new(),
            blocks_proposed: Counter::new(),
            view_changes_started: Counter::new(),
            view_change_escalations: Counter::new(),
            finality_time_ms: Histogram::new(&FINALITY_BUCKETS_MS),
            current_view: Gauge::new(),
            chain_height: Gauge::new(),
            dropped_unknown_validator: Counter::new(),
            dropped_bad_signature: Counter::new(),
            dropped_stale_view: Counter::new(),
            dropped_stale_height: Counter::new(),
            dropped_view_horizon: Counter::new(),
            dropped_not_leader: Counter::new(),
            dropped_duplicate: Counter::new(),
            parent_gap_buffered: Counter::new(),
            finalize_aborts: Counter::new(),
            conflicting_votes: Counter::new(),
            mempool_size: Gauge::new(),
            mempool_admitted: Counter::new(),
            mempool_rejected: Counter::new(),
            mempool_shed: Counter::new(),
            mempool_swept: Counter::new(),
            stream_enqueued: Counter::new(),
            stream_acked: Counter::new(),
            stream_pending: Gauge::new(),
        }
    }

    /// Fold every instrument into the export list. This table is the
    /// single place a metric's name and help text exist.
    pub fn snapshot(&self) -> Vec<Sample> {
        fn counter(name: &'static str, help: &'static str, c: &Counter) -> Sample {
            Sample {
                name,
                help,
                value: Observation::Counter(c.get()),
            }
        }
        fn gauge(name: &'static str, help: &'static str, g: &Gauge) -> Sample {
            Sample {
                name,
                help,
                value: Observation::Gauge(g.get()),
            }
        }

        vec![
            counter(
                "tripcoin_blocks_finalized_total",
                "Total blocks finalized by this replica",
                &self.blocks_finalized,
            ),
            counter(
                "tripcoin_blocks_proposed_total",
                "Total blocks proposed while primary",
                &self.blocks_proposed,
            ),
            counter(
                "tripcoin_view_changes_started_total",
                "Total view changes this replica initiated or joined",
                &self.view_changes_started,
            ),
            counter(
                "tripcoin_view_change_escalations_total",
                "Total view-change rounds that escalated without quorum",
                &self.view_change_escalations,
            ),
            Sample {
                name: "tripcoin_finality_time_ms",
                help: "Time from proposal to finalization in milliseconds",
                value: self.finality_time_ms.observation(),
            },
            gauge(
                "tripcoin_current_view",
                "Current consensus view",
                &self.current_view,
            ),
            gauge(
                "tripcoin_chain_height",
                "Latest finalized height",
                &self.chain_height,
            ),
            counter(
                "tripcoin_dropped_unknown_validator_total",
                "Messages dropped: sender not in the registry snapshot",
                &self.dropped_unknown_validator,
            ),
            counter(
                "tripcoin_dropped_bad_signature_total",
                "Messages dropped: signature verification failed",
                &self.dropped_bad_signature,
            ),
            counter(
                "tripcoin_dropped_stale_view_total",
                "Messages dropped: tagged with a past view",
                &self.dropped_stale_view,
            ),
            counter(
                "tripcoin_dropped_stale_height_total",
                "Messages dropped: block height already finalized",
                &self.dropped_stale_height,
            ),
            counter(
                "tripcoin_dropped_view_horizon_total",
                "Messages dropped: view beyond the registry snapshot horizon",
                &self.dropped_view_horizon,
            ),
            counter(
                "tripcoin_dropped_not_leader_total",
                "PRE-PREPAREs dropped: sender is not the current leader",
                &self.dropped_not_leader,
            ),
            counter(
                "tripcoin_dropped_duplicate_total",
                "Messages dropped: table slot already taken (first-writer-wins)",
                &self.dropped_duplicate,
            ),
            counter(
                "tripcoin_parent_gap_buffered_total",
                "Blocks buffered awaiting an unknown parent",
                &self.parent_gap_buffered,
            ),
            counter(
                "tripcoin_finalize_aborts_total",
                "Finalizations aborted by store failures or missing blocks",
                &self.finalize_aborts,
            ),
            counter(
                "tripcoin_conflicting_votes_total",
                "Conflicting votes recorded as evidence",
                &self.conflicting_votes,
            ),
            gauge(
                "tripcoin_mempool_size",
                "Current pending-transaction count",
                &self.mempool_size,
            ),
            counter(
                "tripcoin_mempool_admitted_total",
                "Transactions admitted to the pool",
                &self.mempool_admitted,
            ),
            counter(
                "tripcoin_mempool_rejected_total",
                "Submissions rejected at admission",
                &self.mempool_rejected,
            ),
            counter(
                "tripcoin_mempool_shed_total",
                "Entries shed by fullness-driven eviction",
                &self.mempool_shed,
            ),
            counter(
                "tripcoin_mempool_swept_total",
                "Entries removed by the age sweep",
                &self.mempool_swept,
            ),
            counter(
                "tripcoin_stream_enqueued_total",
                "Consensus messages appended to the stream",
                &self.stream_enqueued,
            ),
            counter(
                "tripcoin_stream_acked_total",
                "Stream entries acknowledged after processing",
                &self.stream_acked,
            ),
            gauge(
                "tripcoin_stream_pending",
                "Delivered-but-unacked entries across the consumer group",
                &self.stream_pending,
            ),
        ]
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}
