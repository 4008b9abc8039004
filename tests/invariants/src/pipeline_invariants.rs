//! Property-based tests for the stream pipeline's delivery laws.
//!
//! The stream promises at-least-once delivery; the replica promises
//! idempotent handlers. Together: every enqueued message is applied to
//! state exactly once, no matter which handler invocations fail and how
//! redelivery interleaves.

#[cfg(test)]
mod tests {
    use {
        async_trait::async_trait,
        parking_lot::Mutex,
        proptest::prelude::*,
        std::{
            collections::{HashMap, HashSet},
            sync::Arc,
            time::Duration,
        },
        tokio::sync::watch,
        tripcoin_store::{MemoryKv, MemoryStream, StreamBus},
        tripcoin_stream::{
            enqueue, init_stream, ConsumerConfig, QueuedHandler, StreamConsumer, GROUP_NAME,
            STREAM_NAME,
        },
    };

    /// A state sink with replica-style idempotence: applying the same
    /// payload twice changes nothing. Fails each payload a scripted number
    /// of times first.
    struct IdempotentSink {
        applied: Mutex<HashSet<String>>,
        deliveries: Mutex<HashMap<String, u32>>,
        failures: Mutex<HashMap<String, u32>>,
    }

    impl IdempotentSink {
        fn new(failures: HashMap<String, u32>) -> Arc<Self> {
            Arc::new(Self {
                applied: Mutex::new(HashSet::new()),
                deliveries: Mutex::new(HashMap::new()),
                failures: Mutex::new(failures),
            })
        }
    }

    #[async_trait]
    impl QueuedHandler for IdempotentSink {
        async fn process(&self, payload: &str) -> Result<(), String> {
            *self.deliveries.lock().entry(payload.to_string()).or_insert(0) += 1;
            if let Some(left) = self.failures.lock().get_mut(payload) {
                if *left > 0 {
                    *left -= 1;
                    return Err("scripted failure".to_string());
                }
            }
            self.applied.lock().insert(payload.to_string());
            Ok(())
        }
    }

    fn fast_config() -> ConsumerConfig {
        ConsumerConfig {
            batch_size: 8,
            block: Duration::from_millis(2),
            poll_interval: Duration::from_millis(1),
            claim_min_idle: Duration::ZERO,
        }
    }

    /// Run consumers until the group has nothing pending and nothing new,
    /// restarting each consumer (same name) between passes to model crash
    /// recovery.
    async fn drain(
        bus: Arc<MemoryStream>,
        sink: Arc<IdempotentSink>,
        workers: usize,
        passes: usize,
    ) {
        for _ in 0..passes {
            let mut handles = Vec::new();
            for worker in 0..workers {
                let consumer = StreamConsumer::new(
                    bus.clone(),
                    sink.clone(),
                    format!("worker-{worker}"),
                    fast_config(),
                );
                let (tx, rx) = watch::channel(false);
                handles.push(tokio::spawn(async move {
                    let run = consumer.run(rx);
                    tokio::pin!(run);
                    tokio::select! {
                        _ = &mut run => {}
                        _ = tokio::time::sleep(Duration::from_millis(40)) => {
                            tx.send(true).unwrap();
                            let _ = run.await;
                        }
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
            let pending = bus.group_pending(STREAM_NAME, GROUP_NAME).await.unwrap();
            if pending == 0 {
                break;
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Exactly-once effect despite scripted failures and multi-worker
        /// consumption: every payload is applied, each at least delivered
        /// once, and the idempotent state holds one entry per payload.
        #[test]
        fn prop_each_message_applied_exactly_once(
            message_count in 1usize..24,
            failure_seed in prop::collection::vec(0u32..3, 1..24),
            workers in 1usize..4,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("runtime");
            runtime.block_on(async {
                let bus = Arc::new(MemoryStream::new());
                let kv = MemoryKv::new();
                init_stream(bus.as_ref(), &kv).await.unwrap();

                let mut failures = HashMap::new();
                let mut expected = HashSet::new();
                for i in 0..message_count {
                    let payload = format!("m{i}");
                    failures.insert(
                        payload.clone(),
                        failure_seed.get(i).copied().unwrap_or(0),
                    );
                    expected.insert(payload.clone());
                    enqueue(bus.as_ref(), &payload).await.unwrap();
                }

                let sink = IdempotentSink::new(failures);
                drain(bus.clone(), sink.clone(), workers, 8).await;

                let applied = sink.applied.lock().clone();
                assert_eq!(applied, expected, "every payload applied exactly once");

                let deliveries = sink.deliveries.lock().clone();
                for payload in &expected {
                    assert!(
                        deliveries.get(payload).copied().unwrap_or(0) >= 1,
                        "{payload} never delivered"
                    );
                }

                assert_eq!(
                    bus.group_pending(STREAM_NAME, GROUP_NAME).await.unwrap(),
                    0,
                    "nothing left pending after drain"
                );
            });
            prop_assert!(true);
        }
    }

    #[tokio::test]
    async fn test_double_consumption_is_harmless() {
        let bus = Arc::new(MemoryStream::new());
        let kv = MemoryKv::new();
        init_stream(bus.as_ref(), &kv).await.unwrap();
        enqueue(bus.as_ref(), "only").await.unwrap();

        let sink = IdempotentSink::new(HashMap::new());
        // Process the same payload twice, as a redelivery would.
        sink.process("only").await.unwrap();
        sink.process("only").await.unwrap();

        assert_eq!(sink.applied.lock().len(), 1);
        assert_eq!(sink.deliveries.lock().get("only"), Some(&2));
    }
}
