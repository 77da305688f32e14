use std::{hint::black_box, time::Duration};

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use tollbucket::{
    Capacity, LocalKeyedLimiter, LocalLimiterOptions, RefillInterval, Replenishable,
};

fn opts(capacity: u64, refill_ms: u64) -> LocalLimiterOptions {
    LocalLimiterOptions {
        capacity: Capacity::try_from(capacity).unwrap(),
        refill_interval: RefillInterval::try_from(Duration::from_millis(refill_ms)).unwrap(),
    }
}

fn bench_hot_key_allowed(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_limiter/hot_key_allowed");
    group.sample_size(200);

    group.bench_function("allow/fixed", |b| {
        // Deep enough that the benchmark never drains it.
        let limiter: LocalKeyedLimiter = LocalKeyedLimiter::new(opts(u64::MAX / 2, 1));

        b.iter(|| {
            black_box(limiter.allow(black_box("k")));
        });
    });

    group.finish();
}

fn bench_many_keys_allowed(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_limiter/many_keys_allowed");
    group.sample_size(100);

    for key_space in [1_000_usize, 100_000] {
        group.bench_function(format!("allow/keys={key_space}"), |b| {
            let limiter: LocalKeyedLimiter = LocalKeyedLimiter::new(opts(1_000_000, 1));
            let keys: Vec<String> = (0..key_space).map(|i| format!("user_{i}")).collect();

            b.iter_batched(
                || 0_usize,
                |mut idx| {
                    idx = idx.wrapping_add(1);
                    let k = &keys[idx % keys.len()];
                    black_box(limiter.allow(black_box(k)));
                    idx
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_reject_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_limiter/reject_path");
    group.sample_size(200);

    group.bench_function("allow/cached_rejection", |b| {
        let limiter: LocalKeyedLimiter = LocalKeyedLimiter::new(opts(10, 60_000));
        for _ in 0..11 {
            let _ = limiter.allow("k");
        }

        b.iter(|| {
            black_box(limiter.allow(black_box("k")));
        });
    });

    group.bench_function("allow/uncached_rejection", |b| {
        let limiter = LocalKeyedLimiter::<Replenishable>::new(opts(10, 60_000));
        for _ in 0..11 {
            let _ = limiter.allow("k");
        }

        b.iter(|| {
            black_box(limiter.allow(black_box("k")));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_hot_key_allowed,
    bench_many_keys_allowed,
    bench_reject_path
);
criterion_main!(benches);
