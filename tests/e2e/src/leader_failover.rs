//! Leader failure, view change, and NEW_VIEW recovery.

use {
    crate::helpers::SimCluster,
    std::time::Duration,
    tripcoin_ledger::{forge, genesis, Block, BlockType},
};

/// Sleep past the fast-config view-change timeout.
async fn outwait_timer() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

#[tokio::test]
async fn test_silent_leader_is_voted_out() {
    let cluster = SimCluster::new(4, SimCluster::fast_config()).await;

    // nodes[0] leads view 0 and never proposes. The others' silence
    // timers expire and the view-change path starts.
    outwait_timer().await;
    cluster.poll_timers().await;
    cluster.pump().await;

    // Assembly timer: quorum of VIEW_CHANGE votes completes the move.
    outwait_timer().await;
    cluster.poll_timers().await;
    cluster.pump().await;

    for (index, node) in cluster.nodes.iter().enumerate() {
        let (view, primary) = node
            .adapter
            .inspect_replica(|replica| (replica.current_view(), replica.is_primary()));
        assert_eq!(view, 1, "node {index} should be at view 1");
        // 1 mod 4 = 1: the second address leads view 1.
        assert_eq!(primary, index == 1, "leadership at node {index}");
    }

    // The silent ex-leader also adopted the view via the NEW_VIEW
    // broadcast and follows the new primary.
    cluster.nodes[1].adapter.tick_round().await;
    cluster.pump().await;
    assert_eq!(cluster.heights().await, vec![1, 1, 1, 1]);
}

#[tokio::test]
async fn test_new_view_reproposes_pending_block() {
    let cluster = SimCluster::new(4, SimCluster::fast_config()).await;

    // The view-0 leader managed to ship its candidate block to the peers
    // before dying — no PRE-PREPARE ever went out.
    let leader = &cluster.nodes[0].keypair;
    let mut orphan = Block {
        index: 1,
        timestamp: "2025-06-01T12:00:00.000Z".to_string(),
        parent_hash: genesis().hash,
        hash: String::new(),
        nonce: 0,
        validator: leader.address(),
        signature: String::new(),
        block_type: BlockType::Transaction,
        body: Vec::new(),
        total_fees: 0,
    };
    forge(&mut orphan, leader);

    for node in &cluster.nodes[1..] {
        node.adapter.deliver_block_proposal(orphan.clone()).await;
    }
    cluster.set_online(0, false);

    // View change rounds: silence, then assembly.
    outwait_timer().await;
    cluster.poll_timers().await;
    cluster.pump().await;
    outwait_timer().await;
    cluster.poll_timers().await;
    cluster.pump().await;

    // The new primary re-proposed the stashed block; the survivors
    // finalized it.
    let heights = cluster.heights().await;
    assert_eq!(&heights[1..], &[1, 1, 1], "survivors finalize the orphan");
    for node in &cluster.nodes[1..] {
        let block = node.blocks.get_block_by_height(1).await.unwrap().unwrap();
        assert_eq!(block.hash, orphan.hash);
    }
}

#[tokio::test]
async fn test_view_change_escalates_without_quorum() {
    let cluster = SimCluster::new(4, SimCluster::fast_config()).await;

    // Partition: only nodes[3] is online, so its VIEW_CHANGE votes can
    // never assemble a quorum of 3.
    for index in 0..3 {
        cluster.set_online(index, false);
    }

    outwait_timer().await;
    cluster.poll_timers().await; // silence fires; VC for view 1
    cluster.pump().await;
    outwait_timer().await;
    cluster.poll_timers().await; // assembly fires; escalate to view 2
    cluster.pump().await;

    let (view, changing) = cluster.nodes[3]
        .adapter
        .inspect_replica(|replica| (replica.current_view(), replica.is_view_changing()));
    assert_eq!(view, 0, "no quorum, no transition");
    assert!(changing, "still hunting for a responsive view");
    assert!(cluster.nodes[3].metrics.view_change_escalations.get() >= 1);
}
