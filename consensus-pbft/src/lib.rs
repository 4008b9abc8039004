//! Tripcoin PBFT Consensus Core
//!
//! This crate implements the replica state machine for a Practical
//! Byzantine Fault Tolerant three-phase protocol over a small, authenticated
//! validator set, with leader rotation on a DPoS schedule:
//!
//! 1. **PRE-PREPARE** — the leader of the current view proposes a block.
//! 2. **PREPARE** — replicas that authenticated the block broadcast
//!    prepares; a quorum witnesses the block is safe to accept.
//! 3. **COMMIT** — upon a prepare quorum, replicas broadcast commits; a
//!    commit quorum finalizes the block deterministically.
//! 4. **VIEW-CHANGE / NEW-VIEW** — when the leader falls silent the
//!    replicas elect the next leader, who re-proposes unfinalized blocks.
//!
//! # Key properties
//!
//! - **Deterministic finality**: a COMMIT quorum is irrevocable; there is
//!   no fork choice beyond the view change.
//! - **Safety with f Byzantine peers**: quorums of `⌊2N/3⌋+1` intersect in
//!   at least one honest replica, so no two blocks finalize at a height.
//! - **Idempotent handlers**: every message path tolerates at-least-once
//!   delivery from the durable stream that feeds it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  Replica                      │
//! │  ┌──────────┐  ┌───────────┐  ┌────────────┐ │
//! │  │ Config   │  │ Validator │  │ Evidence   │ │
//! │  │          │  │ Registry  │  │ Collector  │ │
//! │  └──────────┘  └───────────┘  └────────────┘ │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ view state · round tables · once-guards │  │
//! │  └─────────────────────────────────────────┘  │
//! │  ┌──────────┐  ┌───────────────┐             │
//! │  │ Leader   │  │ ViewTimer     │             │
//! │  │ Schedule │  │               │             │
//! │  └──────────┘  └───────────────┘             │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The replica is a pure state machine: handlers take messages (plus, for
//! PRE-PREPARE, the block authenticator's verdict) and return a
//! [`ReplicaOutput`] describing what to broadcast, enqueue, finalize, or
//! replay. All I/O — network, store, stream — happens in the node layer.

pub mod config;
pub mod evidence;
pub mod registry;
pub mod replica;
pub mod schedule;
pub mod timeout;
pub mod types;

pub use config::PbftConfig;
pub use evidence::{ConflictEvidence, EvidenceCollector, EvidenceKind};
pub use registry::{ValidatorInfo, ValidatorSet, ValidatorStatus};
pub use replica::{Admitted, DropReason, Replica, ReplicaOutput, ViewChangeTick};
pub use schedule::{is_leader, leader_of};
pub use timeout::{TimerDuty, ViewTimer};
pub use types::{
    sign_message, verify_message, BlockKey, ConsensusMessage, MessageKind, NewViewMessage,
    PhaseMessage, ViewChangeMessage,
};
