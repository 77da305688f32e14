use std::time::Duration;

use redis::{Script, aio::ConnectionManager};

use crate::{
    BucketSpec, MAX_EXACT_INTEGER, RateLimitDecision, StoreError, Timestamp, TollbucketError,
    redis::{RedisKeyGenerator, RedisLimiterOptions},
    runtime::with_timeout,
};

// Both scripts derive the current fill exactly like `bucket::refill` and settle the
// record exactly like `bucket::settle`: a full bucket is deleted, anything else is
// written with a TTL equal to the time it needs to become full again.
//
// The record is a hash: `t` = tokens, `u` = last update in ms. Every value fits in
// MAX_EXACT_INTEGER, so Lua numbers hold it exactly; `%d` keeps Redis from writing it
// in exponent notation.

const CONSUME_SCRIPT: &str = r#"
    local key = KEYS[1]

    local capacity = tonumber(ARGV[1])
    local refill_interval_ms = tonumber(ARGV[2])
    local now_ms = tonumber(ARGV[3])
    local max_exact = tonumber(ARGV[4])

    local record = redis.call("HMGET", key, "t", "u")
    local tokens = capacity
    local elapsed_ms = 0

    if record[1] then
        tokens = tonumber(record[1])
        elapsed_ms = math.max(now_ms - tonumber(record[2]), 0)

        if tokens >= capacity or elapsed_ms >= (capacity - tokens) * refill_interval_ms then
            tokens = capacity
        else
            tokens = tokens + math.floor(elapsed_ms / refill_interval_ms)
        end
    end

    if tokens < 1 then
        return {0, now_ms + refill_interval_ms - (elapsed_ms % refill_interval_ms)}
    end

    tokens = tokens - 1

    if tokens >= capacity then
        redis.call("DEL", key)
    else
        local ttl_ms = math.min((capacity - tokens) * refill_interval_ms, max_exact)
        redis.call("HSET", key, "t", string.format("%d", tokens), "u", string.format("%d", now_ms))
        redis.call("PEXPIRE", key, string.format("%d", ttl_ms))
    end

    return {1, now_ms}
"#;

const REPLENISH_SCRIPT: &str = r#"
    local key = KEYS[1]

    local capacity = tonumber(ARGV[1])
    local refill_interval_ms = tonumber(ARGV[2])
    local now_ms = tonumber(ARGV[3])
    local max_exact = tonumber(ARGV[4])
    local count = tonumber(ARGV[5])

    local record = redis.call("HMGET", key, "t", "u")
    local tokens = capacity

    if record[1] then
        tokens = tonumber(record[1])
        local elapsed_ms = math.max(now_ms - tonumber(record[2]), 0)

        if tokens >= capacity or elapsed_ms >= (capacity - tokens) * refill_interval_ms then
            tokens = capacity
        else
            tokens = tokens + math.floor(elapsed_ms / refill_interval_ms)
        end
    end

    tokens = math.min(tokens + count, capacity)

    if tokens >= capacity then
        redis.call("DEL", key)
    else
        local ttl_ms = math.min((capacity - tokens) * refill_interval_ms, max_exact)
        redis.call("HSET", key, "t", string.format("%d", tokens), "u", string.format("%d", now_ms))
        redis.call("PEXPIRE", key, string.format("%d", ttl_ms))
    end

    return tokens
"#;

/// Token buckets whose state lives in Redis.
///
/// Every operation is one Lua script execution, so the read, the refill arithmetic
/// and the conditional write happen atomically with respect to every other client of
/// the same Redis server. Two callers, in the same process or not, can never consume
/// the same token.
///
/// # Storage
///
/// A full bucket has no key in Redis. A bucket below capacity is a hash under
/// `<name>:<key>` with a `PEXPIRE` equal to the time it needs to refill, so Redis
/// drops it at the moment it stops carrying information.
///
/// # Failures
///
/// Any failure to complete the round trip, including the configured timeout, is
/// returned as [`TollbucketError::Unavailable`]. The token may or may not have been
/// consumed.
pub struct RedisBucket {
    connection_manager: ConnectionManager,
    spec: BucketSpec,
    key_generator: RedisKeyGenerator,
    consume_script: Script,
    replenish_script: Script,
    timeout: Option<Duration>,
}

impl RedisBucket {
    /// Create buckets for the given options.
    pub fn new(options: RedisLimiterOptions) -> Self {
        Self {
            spec: options.spec(),
            connection_manager: options.connection_manager,
            key_generator: RedisKeyGenerator::new(options.name),
            consume_script: Script::new(CONSUME_SCRIPT),
            replenish_script: Script::new(REPLENISH_SCRIPT),
            timeout: options.timeout,
        }
    }

    /// Spec shared by every key.
    pub fn spec(&self) -> &BucketSpec {
        &self.spec
    }

    /// Take one token from `key`'s bucket as of `now`.
    pub async fn try_consume(
        &self,
        key: &str,
        now: Timestamp,
    ) -> Result<RateLimitDecision, TollbucketError> {
        with_timeout(self.timeout, self.consume_round_trip(key, now)).await
    } // end method try_consume

    /// Take one token from each of `keys` as of `now`, in one pipelined round trip.
    ///
    /// Each key is still consumed atomically; the batch as a whole is not a
    /// transaction. Decisions are returned in the order of `keys`. On error none of
    /// the outcomes are known.
    pub async fn try_consume_batch(
        &self,
        keys: &[&str],
        now: Timestamp,
    ) -> Result<Vec<RateLimitDecision>, TollbucketError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        with_timeout(self.timeout, self.consume_batch_round_trip(keys, now)).await
    } // end method try_consume_batch

    /// Add `count` tokens to `key`'s bucket as of `now`, capped at capacity.
    pub async fn replenish(
        &self,
        key: &str,
        now: Timestamp,
        count: u64,
    ) -> Result<(), TollbucketError> {
        if count == 0 {
            return Err(TollbucketError::InvalidArgument(
                "Replenish count must be greater than 0".to_string(),
            ));
        }

        with_timeout(self.timeout, self.replenish_round_trip(key, now, count)).await?;

        Ok(())
    } // end method replenish

    pub(crate) fn bucket_key(&self, key: &str) -> String {
        self.key_generator.get_bucket_key(key)
    }

    async fn consume_round_trip(
        &self,
        key: &str,
        now: Timestamp,
    ) -> Result<RateLimitDecision, TollbucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let reply: (i64, u64) = self
            .consume_script
            .key(self.bucket_key(key))
            .arg(*self.spec.capacity())
            .arg(*self.spec.refill_interval())
            .arg(now.as_millis())
            .arg(MAX_EXACT_INTEGER)
            .invoke_async(&mut connection_manager)
            .await
            .inspect_err(|err| tracing::error!(error = ?err, key, "redis.consume.error"))?;

        decision_from_reply(reply, now)
    }

    async fn consume_batch_round_trip(
        &self,
        keys: &[&str],
        now: Timestamp,
    ) -> Result<Vec<RateLimitDecision>, TollbucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let replies: Vec<(i64, u64)> = self
            .build_consume_pipeline(keys, now)
            .query_async(&mut connection_manager)
            .await
            .inspect_err(|err| {
                tracing::error!(error = ?err, batch_size = keys.len(), "redis.consume_batch.error")
            })?;

        if replies.len() != keys.len() {
            return Err(StoreError::MalformedReply(format!(
                "expected {} replies, got {}",
                keys.len(),
                replies.len()
            ))
            .into());
        }

        replies
            .into_iter()
            .map(|reply| decision_from_reply(reply, now))
            .collect()
    }

    #[inline]
    fn build_consume_pipeline(&self, keys: &[&str], now: Timestamp) -> redis::Pipeline {
        let mut pipe = redis::Pipeline::new();

        // Loaded up front: EVALSHA never answers NOSCRIPT, so a batch is never
        // half-applied and retried.
        pipe.load_script(&self.consume_script).ignore();

        for key in keys {
            pipe.invoke_script(
                self.consume_script
                    .key(self.bucket_key(key))
                    .arg(*self.spec.capacity())
                    .arg(*self.spec.refill_interval())
                    .arg(now.as_millis())
                    .arg(MAX_EXACT_INTEGER),
            );
        }

        pipe
    }

    async fn replenish_round_trip(
        &self,
        key: &str,
        now: Timestamp,
        count: u64,
    ) -> Result<u64, TollbucketError> {
        let mut connection_manager = self.connection_manager.clone();

        let tokens: u64 = self
            .replenish_script
            .key(self.bucket_key(key))
            .arg(*self.spec.capacity())
            .arg(*self.spec.refill_interval())
            .arg(now.as_millis())
            .arg(MAX_EXACT_INTEGER)
            .arg(count)
            .invoke_async(&mut connection_manager)
            .await
            .inspect_err(|err| tracing::error!(error = ?err, key, "redis.replenish.error"))?;

        Ok(tokens)
    }
}

fn decision_from_reply(
    (granted, available_at): (i64, u64),
    now: Timestamp,
) -> Result<RateLimitDecision, TollbucketError> {
    match granted {
        1 => Ok(RateLimitDecision::Allowed),
        0 => Ok(RateLimitDecision::rejected(
            Timestamp::from_millis(available_at),
            now,
        )),
        other => Err(StoreError::MalformedReply(format!("unexpected consume flag {other}")).into()),
    }
}
