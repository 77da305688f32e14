use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, mapref::entry::Entry};

use crate::Timestamp;

/// Fewest writes between two sweeps of a [`TtlMap`].
pub(crate) const MIN_SWEEP_INTERVAL: u64 = 1024;

struct Expiring<V> {
    value: V,
    expires_at: Timestamp,
}

/// What [`TtlMap::update`] should leave behind for a key.
pub(crate) enum Slot<V> {
    Keep,
    Remove,
    Set(V, Timestamp),
}

/// Concurrent map whose entries disappear once their expiry passes.
///
/// An expired entry is indistinguishable from a missing one. Expired entries are
/// dropped lazily when touched, and the whole map is swept inline once the number of
/// writes since the previous sweep reaches the number of entries left by that sweep,
/// which keeps the amortized cost per write constant. Nothing runs in the background.
///
/// Locking is per [`DashMap`] shard, so a hot key only contends with keys hashed to
/// the same shard.
pub(crate) struct TtlMap<V> {
    entries: DashMap<String, Expiring<V>>,
    writes_since_sweep: AtomicU64,
    sweep_threshold: AtomicU64,
    min_sweep_interval: u64,
}

impl<V: Copy> TtlMap<V> {
    pub(crate) fn new() -> Self {
        Self::with_min_sweep_interval(MIN_SWEEP_INTERVAL)
    }

    pub(crate) fn with_min_sweep_interval(min_sweep_interval: u64) -> Self {
        let min_sweep_interval = min_sweep_interval.max(1);

        Self {
            entries: DashMap::new(),
            writes_since_sweep: AtomicU64::new(0),
            sweep_threshold: AtomicU64::new(min_sweep_interval),
            min_sweep_interval,
        }
    }

    /// Live value for `key`.
    pub(crate) fn get(&self, key: &str, now: Timestamp) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value);
            }
        }

        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);

        None
    }

    /// Store `value` until `expires_at`, replacing any previous value.
    pub(crate) fn insert(&self, key: &str, value: V, expires_at: Timestamp, now: Timestamp) {
        if expires_at <= now {
            self.entries.remove(key);
        } else {
            self.entries
                .insert(key.to_string(), Expiring { value, expires_at });
        }

        self.after_write(now);
    } // end method insert

    /// Read-modify-write `key` while holding its shard lock.
    ///
    /// `f` sees the live value (or `None`) and decides what to leave behind. No other
    /// caller can observe or change the key in between.
    pub(crate) fn update<R>(
        &self,
        key: &str,
        now: Timestamp,
        f: impl FnOnce(Option<V>) -> (R, Slot<V>),
    ) -> R {
        let (result, wrote) = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let live = occupied.get().expires_at > now;
                let current = live.then(|| occupied.get().value);

                match f(current) {
                    (result, Slot::Keep) if live => (result, false),
                    (result, Slot::Keep | Slot::Remove) => {
                        occupied.remove();
                        (result, true)
                    }
                    (result, Slot::Set(_, expires_at)) if expires_at <= now => {
                        occupied.remove();
                        (result, true)
                    }
                    (result, Slot::Set(value, expires_at)) => {
                        occupied.insert(Expiring { value, expires_at });
                        (result, true)
                    }
                }
            }
            Entry::Vacant(vacant) => match f(None) {
                (result, Slot::Set(value, expires_at)) if expires_at > now => {
                    vacant.insert(Expiring { value, expires_at });
                    (result, true)
                }
                (result, _) => (result, false),
            },
        };

        // The shard lock is released here, so a sweep cannot deadlock on it.
        if wrote {
            self.after_write(now);
        }

        result
    } // end method update

    /// Drop every expired entry. Returns how many were removed.
    pub(crate) fn purge_expired(&self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let remaining = self.entries.len();
        let removed = before.saturating_sub(remaining);

        tracing::debug!(removed, remaining, "ttl_map.sweep");

        self.sweep_threshold.store(
            (remaining as u64).max(self.min_sweep_interval),
            Ordering::Relaxed,
        );

        removed
    } // end method purge_expired

    /// Number of stored entries, including expired ones not yet swept.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn after_write(&self, now: Timestamp) {
        let writes = self.writes_since_sweep.fetch_add(1, Ordering::Relaxed) + 1;

        if writes < self.sweep_threshold.load(Ordering::Relaxed) {
            return;
        }

        // Only the caller that resets the counter sweeps.
        if self
            .writes_since_sweep
            .compare_exchange(writes, 0, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_expired(now);
        }
    }
}
