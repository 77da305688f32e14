use std::time::Duration;

/// Error type for this crate.
///
/// A rejected request is not an error: it is reported as
/// [`RateLimitDecision::Rejected`](crate::RateLimitDecision::Rejected).
#[derive(Debug, thiserror::Error)]
pub enum TollbucketError {
    /// The shared store could not complete the operation.
    ///
    /// The outcome is unknown: the token may or may not have been consumed.
    /// Callers must not treat this as a denial.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] StoreError),

    /// Limiter construction parameters are invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An operation argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl TollbucketError {
    /// `true` if the error means the store outcome is unknown.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Reasons a round trip to the shared store failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Redis error (connection, protocol, or script failure).
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The round trip did not complete within the configured timeout.
    #[error("round trip timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with something the limiter does not understand.
    #[error("malformed store reply: {0}")]
    MalformedReply(String),
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
impl From<redis::RedisError> for TollbucketError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(StoreError::Redis(err))
    }
}
