use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::HashMap;
use twolevel_rs::{FlatHashMap, Slot, TwoLevelHashMap};

fn bench_count_two_level(c: &mut Criterion) {
    c.bench_function("two_level_count", |b| {
        b.iter(|| {
            let mut m = TwoLevelHashMap::<u64, u64>::with_capacity(8192);
            for i in 0..50_000u64 {
                match m.emplace(i % 20_000) {
                    Slot::Occupied(mut slot) => *slot.get_mut() += 1,
                    Slot::Vacant(slot) => {
                        slot.finish(1);
                    }
                }
            }
            for i in 0..20_000u64 { let _ = m.get(&i); }
            black_box(m.len())
        })
    });
}

fn bench_count_hashmap(c: &mut Criterion) {
    c.bench_function("hashmap_count", |b| {
        b.iter(|| {
            let mut m = HashMap::<u64, u64>::with_capacity(8192);
            for i in 0..50_000u64 { *m.entry(i % 20_000).or_insert(0) += 1; }
            for i in 0..20_000u64 { let _ = m.get(&i); }
            black_box(m.len())
        })
    });
}

fn bench_convert_from_flat(c: &mut Criterion) {
    let mut flat = FlatHashMap::<u64, u64>::new();
    for i in 0..100_000u64 { flat.insert((i, i)); }

    c.bench_function("two_level_from_flat", |b| {
        b.iter(|| black_box(TwoLevelHashMap::<u64, u64>::from_flat(flat.clone()).len()))
    });
}

criterion_group!(benches, bench_count_two_level, bench_count_hashmap, bench_convert_from_flat);
criterion_main!(benches);
