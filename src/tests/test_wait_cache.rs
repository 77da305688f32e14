use crate::{Timestamp, wait_cache::WaitCache};

#[test]
fn entry_is_served_until_available_at() {
    let cache = WaitCache::new();
    cache.record("k", Timestamp::from_millis(2_000), Timestamp::from_millis(1_000));

    assert_eq!(
        cache.peek("k", Timestamp::from_millis(1_999)),
        Some(Timestamp::from_millis(2_000))
    );
    assert_eq!(cache.peek("k", Timestamp::from_millis(2_000)), None);
    assert_eq!(cache.len(), 0);
}

#[test]
fn keys_are_independent() {
    let cache = WaitCache::new();
    cache.record("a", Timestamp::from_millis(500), Timestamp::from_millis(0));

    assert!(cache.peek("a", Timestamp::from_millis(100)).is_some());
    assert!(cache.peek("b", Timestamp::from_millis(100)).is_none());
}

#[test]
fn available_at_in_the_past_is_not_cached() {
    let cache = WaitCache::new();
    cache.record("k", Timestamp::from_millis(100), Timestamp::from_millis(100));

    assert_eq!(cache.len(), 0);
    assert!(cache.peek("k", Timestamp::from_millis(50)).is_none());
}

#[test]
fn later_record_replaces_earlier_one() {
    let cache = WaitCache::new();
    cache.record("k", Timestamp::from_millis(300), Timestamp::from_millis(0));
    cache.record("k", Timestamp::from_millis(900), Timestamp::from_millis(10));

    assert_eq!(
        cache.peek("k", Timestamp::from_millis(400)),
        Some(Timestamp::from_millis(900))
    );
    assert_eq!(cache.len(), 1);
}
