//  Copyright 2026 Concur-Cache Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The segmented table facade: hashes a key, spreads the hash, picks a
//! segment, and delegates. Also the "null cache" variant the builder
//! selects when max-size or a TTL is configured to zero.

use std::{
    hash::{BuildHasher, Hash},
    sync::Arc,
};

use ahash::RandomState;
use parking_lot::Mutex;

use crate::{
    config::CacheConfig,
    listener::{Notification, RemovalCause, RemovalListener},
    metrics::Metrics,
    segment::{Segment, SegmentConfig},
    ticker::Ticker,
};

/// Avalanche-style bit mixer (the finalizer from MurmurHash3), used to
/// spread a user hasher's output before segment/bucket selection so a
/// poorly-distributed `Hash` impl doesn't pile every key into one
/// segment.
fn spread(hash: u64) -> u64 {
    let mut h = hash;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// The live segmented table: a power-of-two array of independently
/// locked [`Segment`]s.
pub(crate) struct Table<K, V, S = RandomState> {
    segments: Vec<Mutex<Segment<K, V>>>,
    shift: u32,
    hash_builder: S,
    listener: Arc<dyn RemovalListener<K, V>>,
    ticker: Arc<dyn Ticker>,
    metrics: Metrics,
    config: CacheConfig,
}

impl<K, V, S> Table<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
    pub fn new(
        shard_count: usize,
        hash_builder: S,
        make_segment_config: impl Fn() -> SegmentConfig,
        listener: Arc<dyn RemovalListener<K, V>>,
        ticker: Arc<dyn Ticker>,
        config: CacheConfig,
    ) -> Self {
        let shard_count = shard_count.next_power_of_two().max(1);
        let segments = (0..shard_count).map(|_| Mutex::new(Segment::new(make_segment_config()))).collect();
        Self { segments, shift: 64 - shard_count.trailing_zeros(), hash_builder, listener, ticker, metrics: Metrics::default(), config }
    }

    fn hash_of(&self, key: &K) -> u64 {
        spread(self.hash_builder.hash_one(key))
    }

    fn shard(&self, hash: u64) -> &Mutex<Segment<K, V>> {
        let index = if self.shift >= 64 { 0 } else { (hash >> self.shift) as usize };
        &self.segments[index & (self.segments.len() - 1)]
    }

    fn now(&self) -> u64 {
        self.ticker.read()
    }

    fn fire(&self, notifications: Vec<Notification<K, V>>) {
        for n in &notifications {
            self.metrics.record_removal(n.cause);
            crate::listener::notify(self.listener.as_ref(), n);
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn get(&self, key: &Arc<K>) -> Option<Arc<V>> {
        let hash = self.hash_of(key);
        let now = self.now();
        let (value, notifications) = self.shard(hash).lock().get(hash, key, now);
        self.metrics.record_get(value.is_some());
        self.fire(notifications);
        value
    }

    pub fn insert(&self, key: Arc<K>, value: Arc<V>, only_if_absent: bool) -> Option<Arc<V>> {
        let hash = self.hash_of(&key);
        let now = self.now();
        let (previous, notifications) = self.shard(hash).lock().put(hash, key, value, only_if_absent, now);
        self.metrics.record_insertion();
        self.fire(notifications);
        previous
    }

    pub fn remove(&self, key: &Arc<K>) -> Option<Arc<V>> {
        let hash = self.hash_of(key);
        let now = self.now();
        let (value, notifications) = self.shard(hash).lock().remove(hash, key, now);
        self.fire(notifications);
        value
    }

    pub fn remove_if_eq(&self, key: &Arc<K>, expected: &Arc<V>) -> bool {
        let hash = self.hash_of(key);
        let now = self.now();
        let (removed, notifications) = self.shard(hash).lock().remove_if_eq(hash, key, expected, now);
        self.fire(notifications);
        removed
    }

    pub fn replace(&self, key: &Arc<K>, value: Arc<V>) -> Option<Arc<V>> {
        let hash = self.hash_of(key);
        let now = self.now();
        let (previous, notifications) = self.shard(hash).lock().replace(hash, key, value, now);
        self.fire(notifications);
        previous
    }

    pub fn replace_if_eq(&self, key: &Arc<K>, expected: &Arc<V>, value: Arc<V>) -> bool {
        let hash = self.hash_of(key);
        let now = self.now();
        let (replaced, notifications) = self.shard(hash).lock().replace_if_eq(hash, key, expected, value, now);
        self.fire(notifications);
        replaced
    }

    pub fn contains_key(&self, key: &Arc<K>) -> bool {
        let hash = self.hash_of(key);
        let now = self.now();
        let (found, notifications) = self.shard(hash).lock().contains_key(hash, key, now);
        self.fire(notifications);
        found
    }

    pub fn contains_value(&self, value: &Arc<V>) -> bool {
        self.segments.iter().any(|s| s.lock().contains_value(value))
    }

    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for segment in &self.segments {
            let notifications = segment.lock().clear();
            self.fire(notifications);
        }
    }

    /// Weakly consistent snapshot of every live entry across all segments,
    /// taken segment-by-segment (spec.md §5: iteration may reflect some
    /// prefix of writes, never raises concurrent-modification, and never
    /// surfaces a reclaimed, expired, or computing entry).
    pub fn snapshot(&self) -> Vec<(Arc<K>, Arc<V>)> {
        let now = self.now();
        self.segments.iter().flat_map(|s| s.lock().snapshot(now)).collect()
    }

    /// Runs every segment's cleanup pass with no associated read/write.
    /// Intended to be called by an out-of-line cleanup executor the
    /// caller schedules; the cache never spawns one itself.
    pub fn run_cleanup(&self) {
        let now = self.now();
        for segment in &self.segments {
            let notifications = segment.lock().maintain(now);
            self.fire(notifications);
        }
    }
}

/// The "evict-on-insert" variant the builder selects when max-size = 0 or
/// any configured TTL = 0: stores nothing and fires the listener
/// synchronously on every `put`.
pub(crate) struct NullCache<K, V> {
    listener: Arc<dyn RemovalListener<K, V>>,
    cause: RemovalCause,
    metrics: Metrics,
    config: CacheConfig,
}

impl<K, V> NullCache<K, V> {
    pub fn new(listener: Arc<dyn RemovalListener<K, V>>, cause: RemovalCause, config: CacheConfig) -> Self {
        Self { listener, cause, metrics: Metrics::default(), config }
    }

    pub fn get(&self, _key: &Arc<K>) -> Option<Arc<V>> {
        self.metrics.record_get(false);
        None
    }

    pub fn insert(&self, key: Arc<K>, value: Arc<V>) -> Option<Arc<V>> {
        let notification = Notification { key: Some(key), value: Some(value), cause: self.cause };
        self.metrics.record_removal(self.cause);
        crate::listener::notify(self.listener.as_ref(), &notification);
        None
    }

    pub fn remove(&self, _key: &Arc<K>) -> Option<Arc<V>> {
        None
    }

    pub fn len(&self) -> usize {
        0
    }

    pub fn is_empty(&self) -> bool {
        true
    }

    pub fn clear(&self) {}

    pub fn contains_key(&self, _key: &Arc<K>) -> bool {
        false
    }

    pub fn contains_value(&self, _value: &Arc<V>) -> bool {
        false
    }
}

enum Inner<K, V, S> {
    Table(Table<K, V, S>),
    Null(NullCache<K, V>),
}

/// A configurable concurrent associative cache: a segmented hash table
/// with optional size-based LRU eviction, TTL expiration, and
/// reference-strength control over keys and values.
///
/// Keys and values are always handed to and returned from the cache as
/// `Arc<K>`/`Arc<V>` (see `DESIGN.md` for why) — this lets SOFT/WEAK
/// strength compare by the exact allocation the caller inserted, not by
/// incidental structural equality.
pub struct Cache<K, V, S = RandomState> {
    inner: Inner<K, V, S>,
}

impl<K, V, S> Cache<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
    pub(crate) fn from_table(table: Table<K, V, S>) -> Self {
        Self { inner: Inner::Table(table) }
    }

    pub(crate) fn null(listener: Arc<dyn RemovalListener<K, V>>, cause: RemovalCause, config: CacheConfig) -> Self {
        Self { inner: Inner::Null(NullCache::new(listener, cause, config)) }
    }

    pub fn metrics(&self) -> &Metrics {
        match &self.inner {
            Inner::Table(t) => t.metrics(),
            Inner::Null(n) => &n.metrics,
        }
    }

    /// This cache's resolved configuration (spec.md §3's `CacheConfig`
    /// entity), independent of the one-shot builder that produced it.
    /// Round-trips through `serde` so it can be persisted and used to
    /// rebuild an equivalent [`CacheBuilder`](crate::CacheBuilder) later —
    /// spec.md §6 requires only the *configuration* to survive a
    /// serialize/deserialize cycle, not the live entries' ordering.
    pub fn config(&self) -> CacheConfig {
        match &self.inner {
            Inner::Table(t) => t.config(),
            Inner::Null(n) => n.config,
        }
    }

    pub fn get(&self, key: &Arc<K>) -> Option<Arc<V>> {
        match &self.inner {
            Inner::Table(t) => t.get(key),
            Inner::Null(n) => n.get(key),
        }
    }

    pub fn insert(&self, key: Arc<K>, value: Arc<V>) -> Option<Arc<V>> {
        match &self.inner {
            Inner::Table(t) => t.insert(key, value, false),
            Inner::Null(n) => n.insert(key, value),
        }
    }

    pub fn insert_if_absent(&self, key: Arc<K>, value: Arc<V>) -> Option<Arc<V>> {
        match &self.inner {
            Inner::Table(t) => t.insert(key, value, true),
            Inner::Null(n) => n.insert(key, value),
        }
    }

    pub fn remove(&self, key: &Arc<K>) -> Option<Arc<V>> {
        match &self.inner {
            Inner::Table(t) => t.remove(key),
            Inner::Null(n) => n.remove(key),
        }
    }

    pub fn remove_if_eq(&self, key: &Arc<K>, expected: &Arc<V>) -> bool {
        match &self.inner {
            Inner::Table(t) => t.remove_if_eq(key, expected),
            Inner::Null(_) => false,
        }
    }

    pub fn replace(&self, key: &Arc<K>, value: Arc<V>) -> Option<Arc<V>> {
        match &self.inner {
            Inner::Table(t) => t.replace(key, value),
            Inner::Null(_) => None,
        }
    }

    pub fn replace_if_eq(&self, key: &Arc<K>, expected: &Arc<V>, value: Arc<V>) -> bool {
        match &self.inner {
            Inner::Table(t) => t.replace_if_eq(key, expected, value),
            Inner::Null(_) => false,
        }
    }

    pub fn contains_key(&self, key: &Arc<K>) -> bool {
        match &self.inner {
            Inner::Table(t) => t.contains_key(key),
            Inner::Null(n) => n.contains_key(key),
        }
    }

    pub fn contains_value(&self, value: &Arc<V>) -> bool {
        match &self.inner {
            Inner::Table(t) => t.contains_value(value),
            Inner::Null(n) => n.contains_value(value),
        }
    }

    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Table(t) => t.len(),
            Inner::Null(n) => n.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.inner {
            Inner::Table(t) => t.is_empty(),
            Inner::Null(n) => n.is_empty(),
        }
    }

    pub fn clear(&self) {
        match &self.inner {
            Inner::Table(t) => t.clear(),
            Inner::Null(n) => n.clear(),
        }
    }

    /// Runs the eviction/expiration sweep on every segment with no
    /// associated read/write. The cache amortizes cleanup onto caller
    /// threads by default (spec.md §5); a long-lived process that wants
    /// bounded cleanup latency under low traffic can call this from its
    /// own scheduled task instead.
    pub fn run_pending_cleanup(&self) {
        if let Inner::Table(t) = &self.inner {
            t.run_cleanup();
        }
    }

    /// A weakly consistent snapshot iterator over every live entry. The
    /// snapshot is taken eagerly when this is called, segment by segment —
    /// it reflects some prefix of concurrent writes, never panics on a
    /// concurrent mutation, and never yields a reclaimed, expired, or
    /// in-flight computing entry.
    pub fn iter(&self) -> Iter<K, V> {
        let entries = match &self.inner {
            Inner::Table(t) => t.snapshot(),
            Inner::Null(_) => Vec::new(),
        };
        Iter { entries: entries.into_iter() }
    }
}

impl<K, V, S> IntoIterator for &Cache<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
    type Item = (Arc<K>, Arc<V>);
    type IntoIter = Iter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A weakly consistent snapshot iterator produced by [`Cache::iter`].
pub struct Iter<K, V> {
    entries: std::vec::IntoIter<(Arc<K>, Arc<V>)>,
}

impl<K, V> Iterator for Iter<K, V> {
    type Item = (Arc<K>, Arc<V>);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use crate::{builder::CacheBuilder, ticker::FakeTicker, RemovalCause, RemovalListener};

    #[derive(Clone, Default)]
    struct CountingListener {
        causes: Arc<Mutex<Vec<RemovalCause>>>,
    }

    impl<K, V> RemovalListener<K, V> for CountingListener {
        fn on_removal(&self, _key: Option<&Arc<K>>, _value: Option<&Arc<V>>, cause: RemovalCause) {
            self.causes.lock().unwrap().push(cause);
        }
    }

    #[test_log::test]
    fn scenario_1_put_get_remove() {
        let cache = CacheBuilder::<u64, u64>::new().build().unwrap();
        cache.insert(Arc::new(1), Arc::new(1));
        assert_eq!(cache.get(&Arc::new(1)), Some(Arc::new(1)));
        assert_eq!(cache.remove(&Arc::new(1)), Some(Arc::new(1)));
        assert_eq!(cache.get(&Arc::new(1)), None);
    }

    #[test_log::test]
    fn scenario_2_maximum_size_zero_is_null_cache() {
        let listener = CountingListener::default();
        let cache = CacheBuilder::<u64, u64>::new()
            .maximum_size(0)
            .unwrap()
            .removal_listener(listener.clone())
            .unwrap()
            .build()
            .unwrap();
        cache.insert(Arc::new(1), Arc::new(1));
        cache.insert(Arc::new(2), Arc::new(2));
        assert_eq!(cache.len(), 0);
        assert_eq!(listener.causes.lock().unwrap().len(), 2);
        assert!(listener.causes.lock().unwrap().iter().all(|c| *c == RemovalCause::Size));
    }

    #[test_log::test]
    fn scenario_3_expire_after_write_with_fake_ticker() {
        let ticker = FakeTicker::new();
        let cache = CacheBuilder::<u64, u64>::new()
            .expire_after_write(Duration::from_nanos(100))
            .unwrap()
            .ticker(ticker.clone())
            .unwrap()
            .build()
            .unwrap();
        cache.insert(Arc::new(1), Arc::new(1));
        ticker.advance(50);
        assert_eq!(cache.get(&Arc::new(1)), Some(Arc::new(1)));
        ticker.advance(51);
        assert_eq!(cache.get(&Arc::new(1)), None);
    }

    #[test_log::test]
    fn scenario_4_maximum_size_evicts_lru() {
        let cache = CacheBuilder::<u64, u64>::new()
            .maximum_size(2)
            .unwrap()
            .concurrency_level(1)
            .unwrap()
            .build()
            .unwrap();
        cache.insert(Arc::new(1), Arc::new(1));
        cache.insert(Arc::new(2), Arc::new(2));
        cache.get(&Arc::new(1));
        cache.insert(Arc::new(3), Arc::new(3));
        assert_eq!(cache.get(&Arc::new(2)), None);
        assert!(cache.get(&Arc::new(1)).is_some());
        assert!(cache.get(&Arc::new(3)).is_some());
    }

    #[test_log::test]
    fn scenario_6_weak_keys_compare_by_identity() {
        let cache = CacheBuilder::<u64, String>::new().weak_keys().unwrap().build().unwrap();
        let k1 = Arc::new(1u64);
        cache.insert(k1.clone(), Arc::new("v".to_string()));
        let k2 = Arc::new(1u64);
        assert!(cache.get(&k2).is_none());
        assert!(cache.get(&k1).is_some());
    }

    #[test_log::test]
    fn builder_rejects_setting_a_knob_twice() {
        let err = CacheBuilder::<u64, u64>::new().maximum_size(1).unwrap().maximum_size(2);
        assert!(err.is_err());
    }

    #[test_log::test]
    fn builder_rejects_legacy_ttl_combined_with_modern_ttl() {
        let err = CacheBuilder::<u64, u64>::new()
            .expire_after_write(Duration::from_secs(1))
            .unwrap()
            .expiration(crate::builder::Expiration::AfterAccess(Duration::from_secs(1)));
        assert!(err.is_err());
    }

    #[test_log::test]
    fn builder_rejects_zero_concurrency_level() {
        let err = CacheBuilder::<u64, u64>::new().concurrency_level(0);
        assert!(err.is_err());
    }

    #[test_log::test]
    fn iter_reflects_live_entries_only() {
        let cache = CacheBuilder::<u64, u64>::new().build().unwrap();
        cache.insert(Arc::new(1), Arc::new(10));
        cache.insert(Arc::new(2), Arc::new(20));
        let mut seen: Vec<u64> = cache.iter().map(|(k, _)| *k).collect();
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
    }

    #[test_log::test]
    fn replace_only_succeeds_for_existing_key() {
        let cache = CacheBuilder::<u64, u64>::new().build().unwrap();
        assert_eq!(cache.replace(&Arc::new(1), Arc::new(1)), None);
        cache.insert(Arc::new(1), Arc::new(1));
        assert_eq!(cache.replace(&Arc::new(1), Arc::new(2)), Some(Arc::new(1)));
        assert_eq!(cache.get(&Arc::new(1)), Some(Arc::new(2)));
    }

    #[test_log::test]
    fn contains_value_finds_live_values() {
        let cache = CacheBuilder::<u64, u64>::new().build().unwrap();
        cache.insert(Arc::new(1), Arc::new(42));
        assert!(cache.contains_value(&Arc::new(42)));
        assert!(!cache.contains_value(&Arc::new(43)));
    }

    #[test_log::test]
    fn fuzz_matches_a_reference_hashmap_under_random_operations() {
        use rand::{rngs::SmallRng, Rng, SeedableRng};
        use std::collections::HashMap;

        let cache = CacheBuilder::<u64, u64>::new().build().unwrap();
        let mut model: HashMap<u64, u64> = HashMap::new();
        let mut rng = SmallRng::seed_from_u64(0x5EED_C0FF_EE00_u64);

        for _ in 0..5_000 {
            let key = rng.gen_range(0..64);
            match rng.gen_range(0..3) {
                0 => {
                    let value = rng.gen::<u64>();
                    let previous = cache.insert(Arc::new(key), Arc::new(value));
                    assert_eq!(previous.as_deref().copied(), model.insert(key, value));
                }
                1 => {
                    let expected = model.get(&key).copied();
                    assert_eq!(cache.get(&Arc::new(key)).as_deref().copied(), expected);
                }
                _ => {
                    let expected = model.remove(&key);
                    assert_eq!(cache.remove(&Arc::new(key)).as_deref().copied(), expected);
                }
            }
        }

        assert_eq!(cache.len(), model.len());
    }
}
