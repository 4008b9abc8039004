//! Mempool benchmarks: admission, pick ordering, and shedding at the cap.

use {
    criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput},
    std::sync::Arc,
    tripcoin_bench::make_tx,
    tripcoin_crypto::Address,
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

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("mempool/add");
    for &count in &[1_000usize, 5_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let pool = make_pool(count + 1);
                for seq in 0..count as u32 {
                    pool.add(make_tx(seq, (seq + 1) as u64, 100)).unwrap();
                }
                pool.len()
            });
        });
    }
    group.finish();
}

fn bench_pick(c: &mut Criterion) {
    let mut group = c.benchmark_group("mempool/pick");
    for &size in &[1_000usize, 5_000] {
        let pool = make_pool(size);
        for seq in 0..size as u32 {
            pool.add(make_tx(seq, (seq % 997 + 1) as u64, (seq % 251 + 1) as u64))
                .unwrap();
        }
        group.throughput(Throughput::Elements(500));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| pool.pick(500));
        });
    }
    group.finish();
}

fn bench_shedding_at_cap(c: &mut Criterion) {
    let mut group = c.benchmark_group("mempool/shed_at_cap");
    group.bench_function("cap_5000", |b| {
        b.iter_with_setup(
            || {
                let pool = make_pool(5_000);
                for seq in 0..5_000u32 {
                    pool.add(make_tx(seq, (seq + 1) as u64, 100)).unwrap();
                }
                pool
            },
            |pool| {
                pool.add(make_tx(100_000, 1_000_000, 100)).unwrap();
                pool.len()
            },
        );
    });
    group.finish();
}

criterion_group!(benches, bench_add, bench_pick, bench_shedding_at_cap);
criterion_main!(benches);
