
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod test_redis_bucket;
mod test_wait_cache;
