use std::{env, sync::Arc, time::Duration};

use rand::Rng;
use redis::{AsyncCommands, aio::ConnectionManager};

use super::runtime::{self, block_on};
use crate::{
    Capacity, LimiterName, LocalBucket, MAX_EXACT_INTEGER, RateLimitDecision, RedisBucket,
    RedisLimiterOptions, RefillInterval, StoreError, Timestamp, TollbucketError,
};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_name() -> LimiterName {
    let n: u64 = rand::random();
    LimiterName::try_from(format!("tollbucket_test_{n}")).unwrap()
}

async fn connect(url: &str) -> ConnectionManager {
    redis::Client::open(url)
        .unwrap()
        .get_connection_manager()
        .await
        .unwrap()
}

fn options(
    cm: &ConnectionManager,
    capacity: u64,
    refill: Duration,
    timeout: Option<Duration>,
) -> RedisLimiterOptions {
    RedisLimiterOptions {
        connection_manager: cm.clone(),
        name: unique_name(),
        capacity: Capacity::try_from(capacity).unwrap(),
        refill_interval: RefillInterval::try_from(refill).unwrap(),
        timeout,
    }
}

#[test]
fn consume_writes_record_with_ttl_to_full() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let mut cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 3, Duration::from_secs(10), None));
        let now = Timestamp::now();
        let key = bucket.bucket_key("k");

        let exists: bool = cm.exists(&key).await.unwrap();
        assert!(!exists, "full bucket must have no record");

        assert_eq!(
            bucket.try_consume("k", now).await.unwrap(),
            RateLimitDecision::Allowed
        );

        let tokens: u64 = cm.hget(&key, "t").await.unwrap();
        let last_update: u64 = cm.hget(&key, "u").await.unwrap();
        let pttl: i64 = cm.pttl(&key).await.unwrap();

        assert_eq!(tokens, 2);
        assert_eq!(last_update, now.as_millis());
        assert!(pttl > 9_000 && pttl <= 10_000, "pttl = {pttl}");
    });
}

#[test]
fn drains_then_refills_one_token_per_interval() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 3, Duration::from_secs(1), None));
        let t0 = Timestamp::now();

        for _ in 0..3 {
            assert!(bucket.try_consume("k", t0).await.unwrap().is_allowed());
        }
        assert_eq!(
            bucket.try_consume("k", t0).await.unwrap(),
            RateLimitDecision::Rejected {
                retry_after_ms: 1_000,
                available_at: t0.add_millis(1_000),
            }
        );

        let t1 = t0.add_millis(1_000);
        assert!(bucket.try_consume("k", t1).await.unwrap().is_allowed());
        assert!(!bucket.try_consume("k", t1).await.unwrap().is_allowed());

        let t3 = t0.add_millis(3_000);
        assert!(bucket.try_consume("k", t3).await.unwrap().is_allowed());
        assert!(bucket.try_consume("k", t3).await.unwrap().is_allowed());
        assert!(!bucket.try_consume("k", t3).await.unwrap().is_allowed());
    });
}

#[test]
fn record_expires_once_bucket_is_full_again() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let mut cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 1, Duration::from_millis(200), None));
        let key = bucket.bucket_key("k");

        assert!(bucket.try_consume("k", Timestamp::now()).await.unwrap().is_allowed());
        let exists: bool = cm.exists(&key).await.unwrap();
        assert!(exists);

        runtime::async_sleep(Duration::from_millis(400)).await;

        let exists: bool = cm.exists(&key).await.unwrap();
        assert!(!exists);
        assert!(bucket.try_consume("k", Timestamp::now()).await.unwrap().is_allowed());
    });
}

#[test]
fn replenish_to_capacity_deletes_record() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let mut cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 5, Duration::from_secs(60), None));
        let key = bucket.bucket_key("k");
        let now = Timestamp::now();

        for _ in 0..5 {
            assert!(bucket.try_consume("k", now).await.unwrap().is_allowed());
        }

        bucket.replenish("k", now, 2).await.unwrap();
        let tokens: u64 = cm.hget(&key, "t").await.unwrap();
        let pttl: i64 = cm.pttl(&key).await.unwrap();
        assert_eq!(tokens, 2);
        assert!(pttl > 170_000 && pttl <= 180_000, "pttl = {pttl}");

        bucket.replenish("k", now, 100).await.unwrap();
        let exists: bool = cm.exists(&key).await.unwrap();
        assert!(!exists);
    });
}

#[test]
fn replenish_rejects_zero_count() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 5, Duration::from_secs(1), None));

        let err = bucket.replenish("k", Timestamp::now(), 0).await.unwrap_err();
        assert!(matches!(err, TollbucketError::InvalidArgument(_)));
    });
}

#[test]
fn names_isolate_limiters_sharing_a_key() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let a = RedisBucket::new(options(&cm, 1, Duration::from_secs(60), None));
        let b = RedisBucket::new(options(&cm, 1, Duration::from_secs(60), None));
        let now = Timestamp::now();

        assert!(a.try_consume("user:1", now).await.unwrap().is_allowed());
        assert!(!a.try_consume("user:1", now).await.unwrap().is_allowed());
        assert!(b.try_consume("user:1", now).await.unwrap().is_allowed());
        assert!(a.try_consume("user:2", now).await.unwrap().is_allowed());
    });
}

#[test]
fn concurrent_consumers_never_overdraw() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let bucket = Arc::new(RedisBucket::new(options(&cm, 50, Duration::from_secs(60), None)));
        let now = Timestamp::now();

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                async move {
                    let mut allowed = 0u64;
                    for _ in 0..10 {
                        if bucket.try_consume("hot", now).await.unwrap().is_allowed() {
                            allowed += 1;
                        }
                    }
                    allowed
                }
            })
            .collect();

        let allowed: u64 = runtime::join_all(tasks).await.into_iter().sum();

        assert_eq!(allowed, 50);
    });
}

#[test]
fn decisions_match_local_bucket() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let redis_bucket = RedisBucket::new(options(&cm, 4, Duration::from_secs(5), None));
        let local_bucket = LocalBucket::new(*redis_bucket.spec());

        let mut rng = rand::rng();
        let mut now = Timestamp::now();

        for _ in 0..300 {
            now = now.add_millis(rng.random_range(0..2_000));
            let key = ["a", "b", "c"][rng.random_range(0..3)];

            if rng.random_range(0..10) == 0 {
                let count = rng.random_range(1..4);
                redis_bucket.replenish(key, now, count).await.unwrap();
                local_bucket.replenish(key, now, count).unwrap();
            } else {
                let remote = redis_bucket.try_consume(key, now).await.unwrap();
                let local = local_bucket.try_consume(key, now);
                assert_eq!(remote, local, "key {key} at {}", now.as_millis());
            }
        }
    });
}

#[test]
fn largest_capacity_keeps_exact_counts() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let mut cm = connect(&url).await;
        let bucket = RedisBucket::new(options(
            &cm,
            MAX_EXACT_INTEGER,
            Duration::from_millis(1 << 52),
            None,
        ));
        let local = LocalBucket::new(*bucket.spec());
        let key = bucket.bucket_key("k");
        let now = Timestamp::now();

        for _ in 0..3 {
            assert_eq!(
                bucket.try_consume("k", now).await.unwrap(),
                local.try_consume("k", now)
            );
        }

        let tokens: u64 = cm.hget(&key, "t").await.unwrap();
        let last_update: u64 = cm.hget(&key, "u").await.unwrap();
        let pttl: i64 = cm.pttl(&key).await.unwrap();

        assert_eq!(tokens, MAX_EXACT_INTEGER - 3);
        assert_eq!(Some(tokens), local.state("k", now).map(|s| s.tokens));
        assert_eq!(last_update, now.as_millis());
        // Three missing tokens would take 3 * 2^52 ms; the expiry is capped.
        let cap = MAX_EXACT_INTEGER as i64;
        assert!(pttl > cap - 10_000 && pttl <= cap, "pttl = {pttl}");

        bucket.replenish("k", now, 1).await.unwrap();
        let tokens: u64 = cm.hget(&key, "t").await.unwrap();
        assert_eq!(tokens, MAX_EXACT_INTEGER - 2);
    });
}

#[test]
fn batch_consumes_each_key_in_order() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 1, Duration::from_secs(30), None));
        let now = Timestamp::now();

        let decisions = bucket
            .try_consume_batch(&["a", "a", "b"], now)
            .await
            .unwrap();

        assert_eq!(decisions.len(), 3);
        assert!(decisions[0].is_allowed());
        assert_eq!(
            decisions[1],
            RateLimitDecision::Rejected {
                retry_after_ms: 30_000,
                available_at: now.add_millis(30_000),
            }
        );
        assert!(decisions[2].is_allowed());

        assert!(bucket.try_consume_batch(&[], now).await.unwrap().is_empty());
    });
}

#[test]
fn elapsed_timeout_reports_unavailable() {
    let Some(url) = redis_url() else {
        return;
    };

    block_on(async {
        let cm = connect(&url).await;
        let bucket = RedisBucket::new(options(&cm, 1, Duration::from_secs(1), Some(Duration::ZERO)));

        let err = bucket.try_consume("k", Timestamp::now()).await.unwrap_err();

        assert!(err.is_unavailable());
        assert!(matches!(err, TollbucketError::Unavailable(StoreError::Timeout(_))));
    });
}
