//! In-process token buckets.
//!
//! The local backend keeps bucket state inside the current process using
//! [`DashMap`](dashmap::DashMap). It runs the same arithmetic as the Redis backend and
//! produces the same decisions for the same inputs.
//!
//! # Key Characteristics
//!
//! - **Thread-safe:** per-key read-modify-write under a shard lock
//! - **No I/O:** every method is synchronous and infallible except for argument checks
//! - **Process-scoped:** state is not shared across processes
//! - **Self-cleaning:** full buckets take no memory
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use tollbucket::{Capacity, LocalKeyedLimiter, LocalLimiterOptions, RefillInterval};
//!
//! let limiter: LocalKeyedLimiter = LocalKeyedLimiter::new(LocalLimiterOptions {
//!     capacity: Capacity::try_from(2).unwrap(),
//!     refill_interval: RefillInterval::try_from(Duration::from_secs(1)).unwrap(),
//! });
//!
//! assert!(limiter.allow("10.0.0.1").is_allowed());
//! assert!(limiter.allow("10.0.0.1").is_allowed());
//! assert!(!limiter.allow("10.0.0.1").is_allowed());
//! assert!(limiter.allow("10.0.0.2").is_allowed());
//! ```

mod local_bucket;
pub use local_bucket::*;

mod local_limiter_options;
pub use local_limiter_options::*;
