//! Property-based tests for mempool invariants.
//!
//! Properties tested:
//! 1. Size never exceeds the configured cap, under any op sequence.
//! 2. No two entries ever share a hash.
//! 3. Fees are always derived from gas, never taken from the wire.
//! 4. `pick` returns a deterministic prefix ordered by fee density.

#[cfg(test)]
mod tests {
    use {
        proptest::prelude::*,
        std::sync::Arc,
        tripcoin_crypto::Address,
        tripcoin_ledger::Transaction,
        tripcoin_mempool::{BalanceView, Mempool, MempoolConfig},
    };

    struct RichEveryone;

    impl BalanceView for RichEveryone {
        fn balance(&self, _address: &Address) -> u64 {
            u64::MAX
        }
    }

    fn make_pool(max_size: usize) -> Mempool {
        Mempool::new(
            MempoolConfig {
                max_size,
                ..Default::default()
            },
            Arc::new(RichEveryone),
        )
    }

    fn make_tx(seq: u16, gas_limit: u64, size: u64, wire_fee: u64) -> Transaction {
        Transaction {
            hash: format!("{seq:04x}").repeat(16),
            from: Address::parse(&"aa".repeat(32)).unwrap(),
            to: Address::parse(&"bb".repeat(32)).unwrap(),
            amount: 1,
            gas_limit,
            size: size.max(1),
            fee: wire_fee, // deliberately bogus; admission must overwrite
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add { seq: u16, gas: u64, size: u64, wire_fee: u64 },
        Remove { seq: u16 },
        Sweep,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            6 => (0u16..200, 1u64..1_000, 1u64..1_000, 0u64..u64::MAX / 2).prop_map(
                |(seq, gas, size, wire_fee)| Op::Add { seq, gas, size, wire_fee }
            ),
            2 => (0u16..200).prop_map(|seq| Op::Remove { seq }),
            1 => Just(Op::Sweep),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_size_bounded_and_hashes_unique(
            cap in 1usize..64,
            ops in prop::collection::vec(op_strategy(), 1..200),
        ) {
            let pool = make_pool(cap);
            for op in ops {
                match op {
                    Op::Add { seq, gas, size, wire_fee } => {
                        let _ = pool.add(make_tx(seq, gas, size, wire_fee));
                    }
                    Op::Remove { seq } => {
                        pool.remove([format!("{seq:04x}").repeat(16)]);
                    }
                    Op::Sweep => {
                        pool.sweep();
                    }
                }
                prop_assert!(pool.len() <= cap);

                let picked = pool.pick(cap);
                let mut hashes: Vec<&str> =
                    picked.iter().map(|tx| tx.hash.as_str()).collect();
                let total = hashes.len();
                hashes.sort();
                hashes.dedup();
                prop_assert_eq!(hashes.len(), total, "duplicate hash in pool");
            }
        }

        #[test]
        fn prop_fee_always_derived_from_gas(
            gas in 1u64..10_000,
            wire_fee in 0u64..u64::MAX / 2,
        ) {
            let pool = make_pool(8);
            pool.add(make_tx(1, gas, 100, wire_fee)).unwrap();
            let picked = pool.pick(1);
            // Default gas price is 10.
            prop_assert_eq!(picked[0].fee, gas * 10);
        }

        #[test]
        fn prop_pick_is_sorted_by_density_and_deterministic(
            ops in prop::collection::vec((0u16..100, 1u64..500, 1u64..500), 1..50),
            take in 1usize..20,
        ) {
            let pool = make_pool(1_000);
            for (seq, gas, size) in ops {
                let _ = pool.add(make_tx(seq, gas, size, 0));
            }

            let first = pool.pick(take);
            let second = pool.pick(take);
            prop_assert_eq!(&first, &second, "pick must be deterministic");

            for pair in first.windows(2) {
                let lhs = (pair[0].fee as u128) * (pair[1].size as u128);
                let rhs = (pair[1].fee as u128) * (pair[0].size as u128);
                prop_assert!(
                    lhs > rhs || (lhs == rhs && pair[0].hash < pair[1].hash),
                    "pick out of order"
                );
            }
        }
    }
}
