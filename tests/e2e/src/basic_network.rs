//! Happy-path agreement and admission filtering across a 4-validator
//! network.

use {
    crate::helpers::{make_tx, SimCluster},
    tripcoin_consensus_pbft::{
        sign_message, BlockKey, ConsensusMessage, PbftConfig, PhaseMessage,
    },
    tripcoin_crypto::{Address, Keypair},
};

#[tokio::test]
async fn test_happy_path_four_validators() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;

    // A funded sender submits the same transaction to every node.
    let sender = Address::parse(&"aa".repeat(32)).unwrap();
    cluster.fund_everywhere(&sender, 10_000).await;
    let tx = make_tx(1, &sender, 7);
    for node in &cluster.nodes {
        node.adapter.submit_transaction(tx.clone()).unwrap();
    }

    // View 0: nodes[0] leads and proposes.
    cluster.nodes[0].adapter.tick_round().await;
    cluster.pump().await;

    // Every replica finalized height 1 with the same hash.
    assert_eq!(cluster.heights().await, vec![1, 1, 1, 1]);
    let hashes = cluster.hashes_at(1).await;
    assert!(hashes.iter().all(|h| h.is_some()));
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));

    // The included transaction left every mempool.
    for node in &cluster.nodes {
        assert!(node.mempool.is_empty());
    }

    // State reflects the transfer and the leader's fees + reward.
    let leader = cluster.nodes[0].keypair.address();
    let fee = 7 * 10; // gas × default gas price
    for node in &cluster.nodes {
        assert_eq!(node.state.balance(&sender), 10_000 - 5 - fee);
        assert_eq!(node.state.balance(&leader), fee + 50);
    }
}

#[tokio::test]
async fn test_chain_extends_across_rounds() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;

    // Height 1 from the view-0 leader.
    cluster.nodes[0].adapter.tick_round().await;
    cluster.pump().await;
    assert_eq!(cluster.heights().await, vec![1, 1, 1, 1]);

    // Subsequent rounds from the same leader extend the chain.
    cluster.nodes[0].adapter.tick_round().await;
    cluster.pump().await;
    assert_eq!(cluster.heights().await, vec![2, 2, 2, 2]);

    for node in &cluster.nodes {
        let head = node.blocks.get_head().await.unwrap().unwrap();
        let parent = node.blocks.get_block_by_height(1).await.unwrap().unwrap();
        assert_eq!(head.parent_hash, parent.hash);
    }
}

#[tokio::test]
async fn test_duplicate_prepare_kept_once() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;
    let receiver = &cluster.nodes[2];

    // The same PREPARE from nodes[1], sent three times.
    let mut prepare = ConsensusMessage::Prepare(PhaseMessage {
        block_height: 1,
        block_hash: "ab".repeat(32),
        validator: cluster.nodes[1].keypair.address(),
        view: 0,
        signature: String::new(),
    });
    sign_message(&mut prepare, &cluster.nodes[1].keypair);

    for _ in 0..3 {
        receiver
            .adapter
            .deliver_consensus_message(prepare.clone())
            .await;
    }
    cluster.pump().await;

    let key = BlockKey::new(1, "ab".repeat(32));
    let stored = receiver
        .adapter
        .inspect_replica(|replica| replica.prepare_count(&key));
    assert_eq!(stored, 1, "first writer wins; duplicates leave no trace");
    assert_eq!(receiver.metrics.dropped_duplicate.get(), 2);
}

#[tokio::test]
async fn test_forged_sender_identity_dropped() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;
    let receiver = &cluster.nodes[2];

    // Claims nodes[3]'s identity but is signed with an outsider's key.
    let outsider = Keypair::generate();
    let mut forged = ConsensusMessage::Prepare(PhaseMessage {
        block_height: 1,
        block_hash: "ab".repeat(32),
        validator: cluster.nodes[3].keypair.address(),
        view: 0,
        signature: String::new(),
    });
    sign_message(&mut forged, &outsider);

    receiver.adapter.deliver_consensus_message(forged).await;
    cluster.pump().await;

    let key = BlockKey::new(1, "ab".repeat(32));
    let stored = receiver
        .adapter
        .inspect_replica(|replica| replica.prepare_count(&key));
    assert_eq!(stored, 0, "forged message must leave no trace");
    assert_eq!(receiver.metrics.dropped_bad_signature.get(), 1);
}
