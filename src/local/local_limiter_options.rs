use crate::{BucketSpec, Capacity, RefillInterval};

/// Configuration for in-process limiters.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tollbucket::{Capacity, LocalLimiterOptions, RefillInterval};
///
/// let options = LocalLimiterOptions {
///     capacity: Capacity::try_from(10).unwrap(),
///     refill_interval: RefillInterval::try_from(Duration::from_millis(100)).unwrap(),
/// };
/// ```
#[derive(Clone, Debug)]
pub struct LocalLimiterOptions {
    /// Maximum number of tokens per bucket.
    pub capacity: Capacity,
    /// Time to generate one token.
    pub refill_interval: RefillInterval,
}

impl LocalLimiterOptions {
    pub(crate) fn spec(&self) -> BucketSpec {
        BucketSpec::new(self.capacity, self.refill_interval)
    }
}
