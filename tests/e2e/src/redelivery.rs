//! At-least-once delivery: consumer restarts and duplicated stream
//! entries never double-apply.

use {
    crate::helpers::SimCluster,
    std::time::Duration,
    tripcoin_consensus_pbft::{
        sign_message, BlockKey, ConsensusMessage, PbftConfig, PhaseMessage,
    },
    tripcoin_store::{ReadPosition, StreamBus},
    tripcoin_stream::{QueuedHandler, GROUP_NAME, MESSAGE_FIELD, STREAM_NAME},
};

#[tokio::test]
async fn test_commit_delivered_twice_counts_once() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;
    let receiver = &cluster.nodes[2];

    let mut commit = ConsensusMessage::Commit(PhaseMessage {
        block_height: 1,
        block_hash: "ab".repeat(32),
        validator: cluster.nodes[3].keypair.address(),
        view: 0,
        signature: String::new(),
    });
    sign_message(&mut commit, &cluster.nodes[3].keypair);

    // Network duplication: the second ingress copy is dropped.
    receiver
        .adapter
        .deliver_consensus_message(commit.clone())
        .await;
    receiver.adapter.deliver_consensus_message(commit).await;
    cluster.pump().await;

    let key = BlockKey::new(1, "ab".repeat(32));
    let stored = receiver
        .adapter
        .inspect_replica(|replica| replica.commit_count(&key));
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn test_full_history_replay_changes_nothing() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;

    cluster.nodes[0].adapter.tick_round().await;
    cluster.pump().await;
    assert_eq!(cluster.heights().await, vec![1, 1, 1, 1]);

    // Simulated consumer restart on nodes[2]: a fresh group cursor
    // redelivers the entire stream history through the same handler.
    let node = &cluster.nodes[2];
    let finalized_before = node.metrics.blocks_finalized.get();
    node.bus
        .create_group(STREAM_NAME, "restart-replay")
        .await
        .unwrap();
    loop {
        let batch = node
            .bus
            .read_group(
                STREAM_NAME,
                "restart-replay",
                "reborn-consumer",
                64,
                Duration::ZERO,
                ReadPosition::New,
            )
            .await
            .unwrap();
        if batch.is_empty() {
            break;
        }
        for entry in batch {
            let payload = entry.field(MESSAGE_FIELD).unwrap();
            node.adapter.process(payload).await.unwrap();
            node.bus
                .ack(STREAM_NAME, "restart-replay", entry.id)
                .await
                .unwrap();
        }
    }
    cluster.pump().await;

    // Exactly one finalization, the chain did not move, and the round
    // tables stayed torn down.
    assert_eq!(node.metrics.blocks_finalized.get(), finalized_before);
    assert_eq!(cluster.heights().await, vec![1, 1, 1, 1]);
    let head = node.blocks.get_head().await.unwrap().unwrap();
    let key = BlockKey::new(1, head.hash);
    let (prepares, commits) = node
        .adapter
        .inspect_replica(|replica| (replica.prepare_count(&key), replica.commit_count(&key)));
    assert_eq!((prepares, commits), (0, 0));
}
