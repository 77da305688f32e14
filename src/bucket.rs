//! Token-bucket arithmetic.
//!
//! Buckets are never refilled by a background task. The current fill is derived on
//! demand from the last persisted fill and the time elapsed since it was written. A
//! full bucket has no record at all: `None` state means `capacity` tokens.
//!
//! The Redis scripts in [`crate::redis`] implement the same rules in Lua; any change
//! here must be mirrored there.

use std::time::Duration;

use crate::{BucketSpec, MAX_EXACT_INTEGER, RateLimitDecision, Timestamp};

/// Persisted fill of a bucket that is not full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketState {
    /// Tokens available as of `last_update`.
    pub tokens: u64,
    /// When `tokens` was last written.
    pub last_update: Timestamp,
}

/// Tokens available at `now`.
///
/// `tokens + floor(elapsed / refill_interval)`, capped at capacity. A `now` earlier
/// than `last_update` (clock skew between callers) counts as zero elapsed time.
pub fn refill(state: Option<&BucketState>, spec: &BucketSpec, now: Timestamp) -> u64 {
    let capacity = *spec.capacity();

    let Some(state) = state else {
        return capacity;
    };

    if state.tokens >= capacity {
        return capacity;
    }

    let missing = capacity - state.tokens;
    let gained = now.millis_since(state.last_update) / *spec.refill_interval();

    if gained >= missing {
        capacity
    } else {
        state.tokens + gained
    }
}

/// Earliest instant at which a token can be taken.
///
/// `now` if a token is available, otherwise the instant the next whole token
/// accrues. When `now` is earlier than `last_update` (clock skew) elapsed time is
/// zero, so the answer is `now + refill_interval`, not `last_update + refill_interval`.
pub fn next_token_at(state: Option<&BucketState>, spec: &BucketSpec, now: Timestamp) -> Timestamp {
    if refill(state, spec, now) >= 1 {
        return now;
    }

    let interval = *spec.refill_interval();
    let elapsed = state.map_or(0, |state| now.millis_since(state.last_update));

    now.add_millis(interval - elapsed % interval)
}

/// Time for a bucket holding `tokens` to refill to capacity.
///
/// Capped at [`MAX_EXACT_INTEGER`] milliseconds, the longest TTL the Redis scripts
/// compute exactly.
pub fn ttl_to_full(tokens: u64, spec: &BucketSpec) -> Duration {
    Duration::from_millis(ttl_to_full_ms(tokens, spec))
}

pub(crate) fn ttl_to_full_ms(tokens: u64, spec: &BucketSpec) -> u64 {
    let missing = (*spec.capacity()).saturating_sub(tokens);
    missing
        .saturating_mul(*spec.refill_interval())
        .min(MAX_EXACT_INTEGER)
}

/// What must happen to the persisted record after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Leave the record as it is.
    Unchanged,
    /// The bucket is full: drop the record.
    Delete,
    /// Persist `state` until `expires_at`, when it would be full again.
    Write {
        state: BucketState,
        expires_at: Timestamp,
    },
}

/// Take one token if available.
pub(crate) fn consume(
    state: Option<&BucketState>,
    spec: &BucketSpec,
    now: Timestamp,
) -> (RateLimitDecision, Transition) {
    let tokens = refill(state, spec, now);

    if tokens == 0 {
        let available_at = next_token_at(state, spec, now);
        return (
            RateLimitDecision::rejected(available_at, now),
            Transition::Unchanged,
        );
    }

    (RateLimitDecision::Allowed, settle(tokens - 1, spec, now))
}

/// Add `count` tokens, capped at capacity.
pub(crate) fn replenish(
    state: Option<&BucketState>,
    spec: &BucketSpec,
    now: Timestamp,
    count: u64,
) -> Transition {
    let tokens = refill(state, spec, now)
        .saturating_add(count)
        .min(*spec.capacity());

    settle(tokens, spec, now)
}

fn settle(tokens: u64, spec: &BucketSpec, now: Timestamp) -> Transition {
    if tokens >= *spec.capacity() {
        return Transition::Delete;
    }

    Transition::Write {
        state: BucketState {
            tokens,
            last_update: now,
        },
        expires_at: now.add_millis(ttl_to_full_ms(tokens, spec)),
    }
}
