use std::{
    ops::Deref,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::TollbucketError;

/// Largest integer every backend represents exactly.
///
/// The Redis scripts compute in Lua numbers (IEEE doubles); values up to 2^53 are
/// exact there, so bucket parameters and record TTLs are kept within it.
pub const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Maximum number of tokens a bucket holds.
///
/// Must be at least 1 and at most [`MAX_EXACT_INTEGER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capacity(u64);

impl Deref for Capacity {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for Capacity {
    type Error = TollbucketError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(TollbucketError::InvalidConfiguration(
                "Capacity must be at least 1".to_string(),
            ))
        } else if value > MAX_EXACT_INTEGER {
            Err(TollbucketError::InvalidConfiguration(
                "Capacity must not exceed 2^53".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

/// Time needed to generate one token, in whole milliseconds.
///
/// Built from a [`Duration`]; any sub-millisecond remainder is truncated and the
/// result must be at least 1 ms and at most 2^52 ms, so that a timestamp plus one
/// interval stays below [`MAX_EXACT_INTEGER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefillInterval(u64);

const MAX_REFILL_INTERVAL_MS: u64 = 1 << 52;

impl RefillInterval {
    /// The interval as a [`Duration`].
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Deref for RefillInterval {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Duration> for RefillInterval {
    type Error = TollbucketError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        let millis = match u64::try_from(value.as_millis()) {
            Ok(millis) if millis <= MAX_REFILL_INTERVAL_MS => millis,
            _ => {
                return Err(TollbucketError::InvalidConfiguration(
                    "Refill interval is too large".to_string(),
                ));
            }
        };

        if millis == 0 {
            Err(TollbucketError::InvalidConfiguration(
                "Refill interval must be at least 1ms".to_string(),
            ))
        } else {
            Ok(Self(millis))
        }
    }
}

/// Immutable bucket parameters shared by every key a limiter serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketSpec {
    capacity: Capacity,
    refill_interval: RefillInterval,
}

impl BucketSpec {
    /// Create a spec from already validated parts.
    pub fn new(capacity: Capacity, refill_interval: RefillInterval) -> Self {
        Self {
            capacity,
            refill_interval,
        }
    }

    /// Validate raw values and create a spec.
    pub fn try_new(capacity: u64, refill_interval: Duration) -> Result<Self, TollbucketError> {
        Ok(Self::new(
            Capacity::try_from(capacity)?,
            RefillInterval::try_from(refill_interval)?,
        ))
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Time to generate one token.
    pub fn refill_interval(&self) -> RefillInterval {
        self.refill_interval
    }
}

/// Milliseconds since the Unix epoch.
///
/// Wall-clock time is used because bucket records are shared between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);

        Self(millis)
    }

    /// Create a timestamp from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, or zero if `earlier` is in the future.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// This timestamp shifted forward by `millis`.
    pub fn add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// This timestamp shifted forward by `duration`, truncated to whole milliseconds.
    pub fn add_duration(&self, duration: Duration) -> Self {
        self.add_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<u64> for Timestamp {
    fn from(millis: u64) -> Self {
        Self(millis)
    }
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// A token was consumed; proceed.
    Allowed,
    /// No token is available. Nothing was consumed.
    Rejected {
        /// Milliseconds until the next token accrues, measured from the decision time.
        retry_after_ms: u64,
        /// Instant at which the next token accrues.
        available_at: Timestamp,
    },
}

impl RateLimitDecision {
    pub(crate) fn rejected(available_at: Timestamp, now: Timestamp) -> Self {
        Self::Rejected {
            retry_after_ms: available_at.millis_since(now),
            available_at,
        }
    }

    /// `true` if a token was consumed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// How long to wait before retrying; zero when allowed.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::Allowed => Duration::ZERO,
            Self::Rejected { retry_after_ms, .. } => Duration::from_millis(*retry_after_ms),
        }
    }
}
