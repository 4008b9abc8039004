//! The network gateway seam.
//!
//! The replica never talks to the network directly: it is handed a
//! [`Gateway`] capability at construction, and the transport glue (HTTP /
//! WebSocket, seed-node admission — outside this repository) calls back
//! into [`ReplicaAdapter::deliver_consensus_message`] and
//! [`ReplicaAdapter::deliver_block_proposal`]. The two sides meet only at
//! these narrow interfaces, which is what keeps the import graph acyclic.
//!
//! [`ReplicaAdapter::deliver_consensus_message`]:
//!     crate::adapter::ReplicaAdapter::deliver_consensus_message
//! [`ReplicaAdapter::deliver_block_proposal`]:
//!     crate::adapter::ReplicaAdapter::deliver_block_proposal

use {
    async_trait::async_trait,
    log::trace,
    tripcoin_consensus_pbft::ConsensusMessage,
    tripcoin_crypto::Address,
    tripcoin_ledger::Block,
};

/// Outbound capabilities the replica needs from the network layer.
///
/// Implementations own their delivery semantics; failures are logged and
/// absorbed there — the consensus path never blocks on an unreachable
/// peer.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fan a consensus message out to all connected peers.
    async fn broadcast(&self, message: &ConsensusMessage);

    /// Ship a proposed block to all connected peers ahead of its
    /// PRE-PREPARE.
    async fn broadcast_block(&self, block: &Block);

    /// Peers currently connected and identified as validators.
    async fn active_validators(&self) -> Vec<Address>;
}

/// A gateway with no peers. Used by single-node setups and tests; every
/// broadcast is a trace-logged no-op.
#[derive(Default)]
pub struct NullGateway;

#[async_trait]
impl Gateway for NullGateway {
    async fn broadcast(&self, message: &ConsensusMessage) {
        trace!("null gateway: dropping broadcast of {}", message.kind());
    }

    async fn broadcast_block(&self, block: &Block) {
        trace!("null gateway: dropping block {}", block.hash);
    }

    async fn active_validators(&self) -> Vec<Address> {
        Vec::new()
    }
}
