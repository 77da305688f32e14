use criterion::{Criterion, criterion_group, criterion_main};

#[cfg(feature = "redis-tokio")]
mod enabled {
    use std::{env, hint::black_box, time::Duration};

    use criterion::Criterion;

    use tollbucket::{
        Capacity, LimiterName, RedisKeyedLimiter, RedisLimiterOptions, RefillInterval,
        Replenishable,
    };

    fn redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:16379/".to_string())
    }

    pub fn bench_allow(c: &mut Criterion) {
        let mut group = c.benchmark_group("redis_limiter");
        group.sample_size(50);

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .build()
            .unwrap();

        let options = rt.block_on(async {
            let client = redis::Client::open(redis_url()).unwrap();
            let connection_manager = client.get_connection_manager().await.unwrap();

            RedisLimiterOptions {
                connection_manager,
                name: LimiterName::try_from("bench").unwrap(),
                capacity: Capacity::try_from(10).unwrap(),
                refill_interval: RefillInterval::try_from(Duration::from_secs(60)).unwrap(),
                timeout: Some(Duration::from_secs(1)),
            }
        });

        let fixed: RedisKeyedLimiter = RedisKeyedLimiter::new(options.clone());
        let replenishable = RedisKeyedLimiter::<Replenishable>::new(options);

        // Drain both buckets and warm the connection.
        rt.block_on(async {
            for _ in 0..11 {
                let _ = fixed.allow("user_1").await.unwrap();
                let _ = replenishable.allow("user_2").await.unwrap();
            }
        });

        group.bench_function("allow/cached_rejection", |b| {
            b.iter(|| {
                let _ = rt.block_on(async {
                    let res = fixed.allow(black_box("user_1")).await;
                    black_box(res)
                });
            });
        });

        group.bench_function("allow/round_trip", |b| {
            b.iter(|| {
                let _ = rt.block_on(async {
                    let res = replenishable.allow(black_box("user_2")).await;
                    black_box(res)
                });
            });
        });

        group.bench_function("allow_batch/16_keys", |b| {
            let keys: Vec<String> = (0..16).map(|i| format!("batch_{i}")).collect();
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

            b.iter(|| {
                let _ = rt.block_on(async {
                    let res = replenishable.allow_batch(black_box(&keys)).await;
                    black_box(res)
                });
            });
        });

        // Give outstanding IO a moment before runtime drop.
        std::thread::sleep(Duration::from_millis(50));
        group.finish();
    }
}

#[cfg(feature = "redis-tokio")]
fn bench_allow(c: &mut Criterion) {
    enabled::bench_allow(c)
}

#[cfg(not(feature = "redis-tokio"))]
fn bench_allow(_: &mut Criterion) {}

criterion_group!(benches, bench_allow);
criterion_main!(benches);
