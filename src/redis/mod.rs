//! Redis-backed token buckets shared across processes.
//!
//! Each operation is a single Lua script, so check-and-consume is atomic on the
//! server no matter how many clients race for the same key. Requires Redis >= 6.2
//! and one of the `redis-tokio` / `redis-smol` features.

mod redis_bucket;
pub use redis_bucket::*;

mod redis_limiter_options;
pub use redis_limiter_options::*;

mod common;
pub use common::*;
