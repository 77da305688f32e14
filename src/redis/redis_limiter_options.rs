use std::{fmt, time::Duration};

use redis::aio::ConnectionManager;

use crate::{BucketSpec, Capacity, LimiterName, RefillInterval};

/// Configuration for Redis-backed limiters.
///
/// # Requirements
///
/// - **Redis version:** >= 6.2.0
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Examples
///
/// ```ignore
/// use std::time::Duration;
/// use tollbucket::{Capacity, LimiterName, RefillInterval, RedisLimiterOptions};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let options = RedisLimiterOptions {
///     connection_manager,
///     name: LimiterName::try_from("login")?, // Keys: login:<key>
///     capacity: Capacity::try_from(5)?,
///     refill_interval: RefillInterval::try_from(Duration::from_secs(12))?,
///     timeout: Some(Duration::from_millis(50)),
/// };
/// ```
#[derive(Clone)]
pub struct RedisLimiterOptions {
    /// Redis connection manager from the `redis` crate.
    ///
    /// Cloned per round trip; it multiplexes and reconnects on its own.
    pub connection_manager: ConnectionManager,

    /// Namespace for every key of this limiter.
    ///
    /// Two limiters with the same name and different specs share records; the
    /// records are not migrated when capacity or refill interval change.
    pub name: LimiterName,

    /// Maximum number of tokens per bucket.
    ///
    /// Bounded by [`MAX_EXACT_INTEGER`](crate::MAX_EXACT_INTEGER) like every
    /// [`Capacity`], which keeps the Lua arithmetic exact.
    pub capacity: Capacity,

    /// Time to generate one token.
    pub refill_interval: RefillInterval,

    /// Upper bound for a single round trip.
    ///
    /// When it elapses the call fails with
    /// [`StoreError::Timeout`](crate::StoreError::Timeout) and the outcome is
    /// unknown. `None` waits as long as the connection does.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for RedisLimiterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `ConnectionManager` has no `Debug` impl.
        f.debug_struct("RedisLimiterOptions")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("refill_interval", &self.refill_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisLimiterOptions {
    pub(crate) fn spec(&self) -> BucketSpec {
        BucketSpec::new(self.capacity, self.refill_interval)
    }
}
