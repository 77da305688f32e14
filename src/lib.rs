#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bucket;

mod clock;
pub use clock::*;

mod common;
pub use common::{
    BucketSpec, Capacity, MAX_EXACT_INTEGER, RateLimitDecision, RefillInterval, Timestamp,
};

mod error;
pub use error::*;

mod limiter;
pub use limiter::*;

pub mod local;
pub use local::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
pub mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use self::redis::{LimiterName, RedisBucket, RedisLimiterOptions};

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod runtime;

mod ttl_map;
mod wait_cache;

#[cfg(test)]
mod tests;
