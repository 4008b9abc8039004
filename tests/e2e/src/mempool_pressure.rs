//! Mempool behavior at capacity and over time.

use {
    crate::helpers::{make_tx, SimCluster},
    tripcoin_consensus_pbft::PbftConfig,
    tripcoin_crypto::Address,
    tripcoin_mempool::AdmissionError,
};

#[tokio::test]
async fn test_full_pool_sheds_then_admits() {
    let cluster = SimCluster::new(1, PbftConfig::default()).await;
    let node = &cluster.nodes[0];

    let sender = Address::parse(&"aa".repeat(32)).unwrap();
    node.state.fund(&sender, u64::MAX / 2).await.unwrap();

    // Fill to the 5000-entry cap with steadily richer transactions.
    for seq in 0..5_000u32 {
        node.adapter
            .submit_transaction(make_tx(seq, &sender, (seq + 1) as u64))
            .unwrap();
    }
    assert_eq!(node.mempool.len(), 5_000);

    // The next admission sheds the cheapest 10% first.
    node.adapter
        .submit_transaction(make_tx(9_999, &sender, 1_000_000))
        .unwrap();
    assert_eq!(node.mempool.len(), 4_501);
    assert_eq!(node.metrics.mempool_shed.get(), 500);

    // The cheapest entries are the ones that went.
    assert!(!node.mempool.contains(&"00000000".repeat(8)));
    assert!(!node.mempool.contains(&"000001f3".repeat(8))); // seq 499
    assert!(node.mempool.contains(&"000001f4".repeat(8))); // seq 500 survives
    assert!(node.mempool.contains(&"0000270f".repeat(8))); // the newcomer
}

#[tokio::test]
async fn test_rejections_carry_reasons() {
    let cluster = SimCluster::new(1, PbftConfig::default()).await;
    let node = &cluster.nodes[0];

    let pauper = Address::parse(&"cc".repeat(32)).unwrap();
    let outcome = node.adapter.submit_transaction(make_tx(1, &pauper, 100));
    assert!(matches!(
        outcome,
        Err(AdmissionError::InsufficientBalance { .. })
    ));

    let sender = Address::parse(&"aa".repeat(32)).unwrap();
    node.state.fund(&sender, 1_000_000).await.unwrap();
    node.adapter
        .submit_transaction(make_tx(2, &sender, 10))
        .unwrap();
    let duplicate = node.adapter.submit_transaction(make_tx(2, &sender, 10));
    assert!(matches!(duplicate, Err(AdmissionError::Duplicate(_))));

    assert_eq!(node.metrics.mempool_rejected.get(), 2);
    assert_eq!(node.metrics.mempool_admitted.get(), 1);
}

#[tokio::test]
async fn test_sweep_evicts_aged_entries() {
    let cluster = SimCluster::new(1, PbftConfig::default()).await;
    let node = &cluster.nodes[0];

    let sender = Address::parse(&"aa".repeat(32)).unwrap();
    node.state.fund(&sender, 1_000_000).await.unwrap();

    let stale = make_tx(1, &sender, 10);
    let fresh = make_tx(2, &sender, 10);
    node.adapter.submit_transaction(stale.clone()).unwrap();
    node.adapter.submit_transaction(fresh.clone()).unwrap();

    node.mempool
        .backdate(&stale.hash, std::time::Duration::from_secs(72 * 60 * 60));
    node.adapter.sweep_mempool();

    assert!(!node.mempool.contains(&stale.hash));
    assert!(node.mempool.contains(&fresh.hash));
    assert_eq!(node.metrics.mempool_swept.get(), 1);
}

#[tokio::test]
async fn test_finalization_drains_included_transactions_only() {
    let cluster = SimCluster::new(4, PbftConfig::default()).await;

    let sender = Address::parse(&"aa".repeat(32)).unwrap();
    cluster.fund_everywhere(&sender, 1_000_000).await;

    let included = make_tx(1, &sender, 10);
    for node in &cluster.nodes {
        node.adapter.submit_transaction(included.clone()).unwrap();
    }
    // A late transaction only the followers know about.
    let late = make_tx(2, &sender, 10);
    for node in &cluster.nodes[1..] {
        node.adapter.submit_transaction(late.clone()).unwrap();
    }

    cluster.nodes[0].adapter.tick_round().await;
    cluster.pump().await;

    assert_eq!(cluster.heights().await, vec![1, 1, 1, 1]);
    for node in &cluster.nodes[1..] {
        assert!(!node.mempool.contains(&included.hash));
        assert!(node.mempool.contains(&late.hash), "uncommitted txs survive");
    }
}
