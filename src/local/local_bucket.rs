use crate::{
    BucketSpec, RateLimitDecision, Timestamp, TollbucketError,
    bucket::{self, BucketState, Transition},
    ttl_map::{Slot, TtlMap},
};

/// In-process token buckets, one per key.
///
/// Behaves exactly like [`RedisBucket`](crate::redis::RedisBucket) given the same
/// spec, keys, timestamps and call order, which makes it usable as a reference in
/// tests as well as a limiter backend for single-process deployments.
///
/// # Storage
///
/// A key has an entry only while its bucket is below capacity. The entry expires at
/// the instant the bucket would be full again, so an expired entry and a missing one
/// mean the same thing. Memory is bounded by the number of keys that are currently
/// not full.
///
/// # Thread Safety
///
/// Each operation is a read-modify-write under the key's [`DashMap`](dashmap::DashMap)
/// shard lock: two callers can never consume the same token.
pub struct LocalBucket {
    spec: BucketSpec,
    states: TtlMap<BucketState>,
}

impl LocalBucket {
    /// Create an empty set of buckets sharing `spec`.
    pub fn new(spec: BucketSpec) -> Self {
        Self {
            spec,
            states: TtlMap::new(),
        }
    }

    /// Spec shared by every key.
    pub fn spec(&self) -> &BucketSpec {
        &self.spec
    }

    /// Take one token from `key`'s bucket as of `now`.
    pub fn try_consume(&self, key: &str, now: Timestamp) -> RateLimitDecision {
        self.states.update(key, now, |state| {
            let (decision, transition) = bucket::consume(state.as_ref(), &self.spec, now);
            (decision, slot(transition))
        })
    } // end method try_consume

    /// Add `count` tokens to `key`'s bucket as of `now`, capped at capacity.
    pub fn replenish(&self, key: &str, now: Timestamp, count: u64) -> Result<(), TollbucketError> {
        if count == 0 {
            return Err(TollbucketError::InvalidArgument(
                "Replenish count must be greater than 0".to_string(),
            ));
        }

        self.states.update(key, now, |state| {
            let transition = bucket::replenish(state.as_ref(), &self.spec, now, count);
            ((), slot(transition))
        });

        Ok(())
    } // end method replenish

    /// Persisted state of `key` as of `now`; `None` means the bucket is full.
    pub fn state(&self, key: &str, now: Timestamp) -> Option<BucketState> {
        self.states.get(key, now)
    }

    /// Number of keys currently holding an entry, including expired entries not yet
    /// reclaimed.
    pub fn tracked_keys(&self) -> usize {
        self.states.len()
    }

    /// Reclaim entries of buckets that have refilled to capacity.
    ///
    /// This also happens on its own as writes accumulate; calling it only makes the
    /// reclamation eager.
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        self.states.purge_expired(now)
    }
}

fn slot(transition: Transition) -> Slot<BucketState> {
    match transition {
        Transition::Unchanged => Slot::Keep,
        Transition::Delete => Slot::Remove,
        Transition::Write { state, expires_at } => Slot::Set(state, expires_at),
    }
}
