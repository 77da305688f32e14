//! Limiter facade.
//!
//! A limiter is a bucket backend ([`LocalBucket`] or [`RedisBucket`]) combined with a
//! replenishment mode ([`Fixed`] or [`Replenishable`]). The mode decides whether the
//! local wait cache sits in front of the backend:
//!
//! | mode            | wait cache | `replenish` |
//! |-----------------|------------|-------------|
//! | [`Fixed`]         | yes        | no          |
//! | [`Replenishable`] | no         | yes         |
//!
//! A fixed bucket only gains tokens as time passes, so a denial that says "no token
//! until T" stays true until T and can be answered locally. A replenishable bucket can
//! gain tokens at any time from any process, so every call goes to the backend.

use std::{marker::PhantomData, sync::Arc};

use crate::{
    Clock, LocalBucket, LocalLimiterOptions, RateLimitDecision, SystemClock, Timestamp,
    TollbucketError, wait_cache::WaitCache,
};

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
use crate::redis::{RedisBucket, RedisLimiterOptions};

mod sealed {
    pub trait Sealed {}
}

/// Whether a limiter's buckets can be replenished from outside.
///
/// Implemented by [`Fixed`] and [`Replenishable`] only.
pub trait Replenishment: sealed::Sealed + Send + Sync + 'static {
    /// Whether denials may be served from the local wait cache.
    const USES_WAIT_CACHE: bool;
}

/// Buckets gain tokens through elapsed time only. Denials are cached locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fixed;

/// Buckets also gain tokens through `replenish`. Every call reaches the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Replenishable;

impl sealed::Sealed for Fixed {}
impl sealed::Sealed for Replenishable {}

impl Replenishment for Fixed {
    const USES_WAIT_CACHE: bool = true;
}

impl Replenishment for Replenishable {
    const USES_WAIT_CACHE: bool = false;
}

/// Key under which single-key limiters store their bucket.
const SINGLE_KEY: &str = "_";

/// A limiter with an independent bucket per request key.
///
/// Per-key state is created on first use and reclaimed by expiry; there is nothing to
/// delete. Use the aliases [`LocalKeyedLimiter`] and [`RedisKeyedLimiter`].
pub struct KeyedLimiter<B, M: Replenishment = Fixed> {
    bucket: B,
    wait_cache: WaitCache,
    clock: Arc<dyn Clock>,
    _mode: PhantomData<M>,
}

/// Keyed limiter with in-process buckets.
pub type LocalKeyedLimiter<M = Fixed> = KeyedLimiter<LocalBucket, M>;

/// Keyed limiter with buckets in Redis.
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub type RedisKeyedLimiter<M = Fixed> = KeyedLimiter<RedisBucket, M>;

impl<B, M: Replenishment> KeyedLimiter<B, M> {
    fn from_bucket(bucket: B) -> Self {
        Self {
            bucket,
            wait_cache: WaitCache::new(),
            clock: Arc::new(SystemClock),
            _mode: PhantomData,
        }
    }

    /// Replace the time source. Defaults to [`SystemClock`].
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.bucket
    }

    #[cfg(test)]
    pub(crate) fn wait_cache(&self) -> &WaitCache {
        &self.wait_cache
    }

    #[inline]
    fn cached_rejection(&self, key: &str, now: Timestamp) -> Option<RateLimitDecision> {
        if !M::USES_WAIT_CACHE {
            return None;
        }

        let available_at = self.wait_cache.peek(key, now)?;
        tracing::trace!(key, available_at = available_at.as_millis(), "wait_cache.hit");

        Some(RateLimitDecision::rejected(available_at, now))
    }

    #[inline]
    fn remember(&self, key: &str, now: Timestamp, decision: &RateLimitDecision) {
        if !M::USES_WAIT_CACHE {
            return;
        }

        if let RateLimitDecision::Rejected { available_at, .. } = decision {
            self.wait_cache.record(key, *available_at, now);
        }
    }
}

impl<M: Replenishment> KeyedLimiter<LocalBucket, M> {
    /// Create a limiter with in-process buckets.
    pub fn new(options: LocalLimiterOptions) -> Self {
        Self::from_bucket(LocalBucket::new(options.spec()))
    }

    /// Take one token for `key`.
    pub fn allow(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();

        if let Some(decision) = self.cached_rejection(key, now) {
            return decision;
        }

        let decision = self.bucket.try_consume(key, now);
        self.remember(key, now, &decision);

        decision
    } // end method allow
}

impl<B> KeyedLimiter<B, Replenishable> {
    /// The bucket backend.
    ///
    /// Only replenishable limiters expose it: a fixed limiter's wait cache is only
    /// correct while nothing but elapsed time adds tokens.
    ///
    /// ```compile_fail
    /// use std::time::Duration;
    /// use tollbucket::{Capacity, LocalKeyedLimiter, LocalLimiterOptions, RefillInterval};
    ///
    /// let limiter: LocalKeyedLimiter = LocalKeyedLimiter::new(LocalLimiterOptions {
    ///     capacity: Capacity::try_from(1).unwrap(),
    ///     refill_interval: RefillInterval::try_from(Duration::from_secs(1)).unwrap(),
    /// });
    ///
    /// let _ = limiter.bucket();
    /// ```
    pub fn bucket(&self) -> &B {
        &self.bucket
    }
}

impl KeyedLimiter<LocalBucket, Replenishable> {
    /// Add `count` tokens to `key`'s bucket, capped at capacity.
    pub fn replenish(&self, key: &str, count: u64) -> Result<(), TollbucketError> {
        self.bucket.replenish(key, self.clock.now(), count)
    }
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
impl<M: Replenishment> KeyedLimiter<RedisBucket, M> {
    /// Create a limiter with buckets in Redis.
    pub fn new(options: RedisLimiterOptions) -> Self {
        Self::from_bucket(RedisBucket::new(options))
    }

    /// Take one token for `key`.
    ///
    /// An error means the outcome is unknown; it is never a denial in disguise, and
    /// it leaves the wait cache untouched.
    pub async fn allow(&self, key: &str) -> Result<RateLimitDecision, TollbucketError> {
        let now = self.clock.now();

        if let Some(decision) = self.cached_rejection(key, now) {
            return Ok(decision);
        }

        let decision = self.bucket.try_consume(key, now).await?;
        self.remember(key, now, &decision);

        Ok(decision)
    } // end method allow

    /// Take one token for each of `keys`.
    ///
    /// Keys with a cached denial are answered locally; the rest share one pipelined
    /// round trip. Decisions are returned in the order of `keys`.
    pub async fn allow_batch(
        &self,
        keys: &[&str],
    ) -> Result<Vec<RateLimitDecision>, TollbucketError> {
        let now = self.clock.now();

        let mut decisions: Vec<Option<RateLimitDecision>> = keys
            .iter()
            .map(|key| self.cached_rejection(key, now))
            .collect();

        let misses: Vec<&str> = keys
            .iter()
            .zip(&decisions)
            .filter(|(_, decision)| decision.is_none())
            .map(|(key, _)| *key)
            .collect();

        let fresh = self.bucket.try_consume_batch(&misses, now).await?;
        let mut fresh = misses.into_iter().zip(fresh);

        for slot in decisions.iter_mut().filter(|decision| decision.is_none()) {
            let Some((key, decision)) = fresh.next() else {
                break;
            };

            self.remember(key, now, &decision);
            *slot = Some(decision);
        }

        Ok(decisions.into_iter().flatten().collect())
    } // end method allow_batch
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
impl KeyedLimiter<RedisBucket, Replenishable> {
    /// Add `count` tokens to `key`'s bucket, capped at capacity.
    ///
    /// Always a full round trip.
    pub async fn replenish(&self, key: &str, count: u64) -> Result<(), TollbucketError> {
        self.bucket.replenish(key, self.clock.now(), count).await
    }
}

/// A limiter guarding a single bucket.
///
/// Use the aliases [`LocalLimiter`] and [`RedisLimiter`].
pub struct Limiter<B, M: Replenishment = Fixed> {
    inner: KeyedLimiter<B, M>,
}

/// Single-bucket limiter held in process.
pub type LocalLimiter<M = Fixed> = Limiter<LocalBucket, M>;

/// Single-bucket limiter held in Redis under `<name>:_`.
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub type RedisLimiter<M = Fixed> = Limiter<RedisBucket, M>;

impl<B, M: Replenishment> Limiter<B, M> {
    /// Replace the time source. Defaults to [`SystemClock`].
    pub fn with_clock(self, clock: impl Clock) -> Self {
        Self {
            inner: self.inner.with_clock(clock),
        }
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        self.inner.backend()
    }
}

impl<B> Limiter<B, Replenishable> {
    /// The bucket backend. The bucket is stored under the key `"_"`.
    pub fn bucket(&self) -> &B {
        self.inner.bucket()
    }
}

impl<M: Replenishment> Limiter<LocalBucket, M> {
    /// Create a limiter with an in-process bucket.
    pub fn new(options: LocalLimiterOptions) -> Self {
        Self {
            inner: KeyedLimiter::<LocalBucket, M>::new(options),
        }
    }

    /// Take one token.
    pub fn allow(&self) -> RateLimitDecision {
        self.inner.allow(SINGLE_KEY)
    }
}

impl Limiter<LocalBucket, Replenishable> {
    /// Add `count` tokens, capped at capacity.
    pub fn replenish(&self, count: u64) -> Result<(), TollbucketError> {
        self.inner.replenish(SINGLE_KEY, count)
    }
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
impl<M: Replenishment> Limiter<RedisBucket, M> {
    /// Create a limiter with a bucket in Redis.
    pub fn new(options: RedisLimiterOptions) -> Self {
        Self {
            inner: KeyedLimiter::<RedisBucket, M>::new(options),
        }
    }

    /// Take one token.
    pub async fn allow(&self) -> Result<RateLimitDecision, TollbucketError> {
        self.inner.allow(SINGLE_KEY).await
    }
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
impl Limiter<RedisBucket, Replenishable> {
    /// Add `count` tokens, capped at capacity.
    pub async fn replenish(&self, count: u64) -> Result<(), TollbucketError> {
        self.inner.replenish(SINGLE_KEY, count).await
    }
}
