use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use dashmap::DashMap;
use rand::prelude::*;
use std::collections::HashMap;
use twolevel_rs::TwoLevelHashMap;

fn generate_test_data(size: usize) -> Vec<(u64, u64)> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..size).map(|_| (rng.gen(), rng.gen())).collect()
}

fn benchmark_insert(c: &mut Criterion) {
    let test_data = generate_test_data(10000);

    c.bench_function("two_level_insert", |b| {
        b.iter(|| {
            let mut map = TwoLevelHashMap::<u64, u64>::new();
            for (k, v) in &test_data {
                black_box(map.insert((*k, *v)));
            }
        })
    });

    c.bench_function("hashmap_insert", |b| {
        b.iter(|| {
            let mut hashmap = HashMap::new();
            for (k, v) in &test_data {
                black_box(hashmap.insert(*k, *v));
            }
        })
    });

    c.bench_function("dashmap_insert", |b| {
        b.iter(|| {
            let dashmap = DashMap::new();
            for (k, v) in &test_data {
                black_box(dashmap.insert(*k, *v));
            }
        })
    });
}

fn benchmark_read(c: &mut Criterion) {
    let test_data = generate_test_data(10000);

    let map: TwoLevelHashMap<u64, u64> = test_data.iter().copied().collect();
    let hashmap: HashMap<u64, u64> = test_data.iter().copied().collect();
    let dashmap: DashMap<u64, u64> = test_data.iter().copied().collect();

    c.bench_function("two_level_read", |b| {
        b.iter(|| {
            for (k, _) in &test_data {
                black_box(map.get(k));
            }
        })
    });

    c.bench_function("hashmap_read", |b| {
        b.iter(|| {
            for (k, _) in &test_data {
                black_box(hashmap.get(k));
            }
        })
    });

    c.bench_function("dashmap_read", |b| {
        b.iter(|| {
            for (k, _) in &test_data {
                black_box(dashmap.get(k));
            }
        })
    });
}

// Merging partial aggregation states, the workload the two-level layout targets.
fn benchmark_merge(c: &mut Criterion) {
    let parts: Vec<Vec<(u64, u64)>> = (0..8u64)
        .map(|seed| {
            let mut rng = StdRng::seed_from_u64(42 + seed);
            (0..50_000).map(|_| (rng.gen_range(0..100_000), 1)).collect()
        })
        .collect();

    c.bench_function("two_level_merge", |b| {
        b.iter_batched(
            || {
                parts
                    .iter()
                    .map(|p| p.iter().copied().collect::<TwoLevelHashMap<u64, u64>>())
                    .collect::<Vec<_>>()
            },
            |states| {
                let mut states = states.into_iter();
                let mut total = states.next().unwrap_or_default();
                for state in states {
                    total.merge(state, |acc, n| *acc += n);
                }
                black_box(total.len())
            },
            BatchSize::LargeInput,
        )
    });

    c.bench_function("hashmap_merge", |b| {
        b.iter_batched(
            || {
                parts
                    .iter()
                    .map(|p| p.iter().copied().collect::<HashMap<u64, u64>>())
                    .collect::<Vec<_>>()
            },
            |states| {
                let mut total = HashMap::new();
                for state in states {
                    for (k, v) in state {
                        *total.entry(k).or_insert(0) += v;
                    }
                }
                black_box(total.len())
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, benchmark_insert, benchmark_read, benchmark_merge);
criterion_main!(benches);
