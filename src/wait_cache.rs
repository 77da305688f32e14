use crate::{Timestamp, ttl_map::TtlMap};

/// Per-key cache of "no token until `available_at`".
///
/// Only sound for limiters whose buckets gain tokens through elapsed time alone: a
/// cached denial stays true until `available_at`, so it can be served without asking
/// the bucket. Entries expire exactly at `available_at`.
pub(crate) struct WaitCache {
    entries: TtlMap<Timestamp>,
}

impl WaitCache {
    pub(crate) fn new() -> Self {
        Self {
            entries: TtlMap::new(),
        }
    }

    /// The cached `available_at` for `key`, if it is still in the future.
    pub(crate) fn peek(&self, key: &str, now: Timestamp) -> Option<Timestamp> {
        self.entries.get(key, now)
    }

    /// Remember that `key` has no token until `available_at`.
    pub(crate) fn record(&self, key: &str, available_at: Timestamp, now: Timestamp) {
        self.entries.insert(key, available_at, available_at, now);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
