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

//! One shard of the segmented table: its own indexer, recency list, and
//! write-order list, all protected by a single lock held by the caller
//! (see `cache.rs`).
//!
//! Every mutating method here runs `run_cleanup` first (reclaimed
//! references, TTL sweeps, size bound) and returns the [`Notification`]s
//! it collected so the caller can fire the removal listener after
//! releasing the lock — user code never runs while a segment is held.

use std::{ptr::NonNull, sync::Arc};

use crate::{
    handle::{self, Entry, EntryFlags},
    list::{LinkKind, List},
    listener::{Notification, RemovalCause},
    reclaim::{ReclaimQueue, SoftRegistry},
    strength::{Strength, StrengthRef},
};

/// Per-segment configuration, shared (read-only after build) by every
/// shard in a `Table`.
pub struct SegmentConfig {
    pub key_strength: Strength,
    pub value_strength: Strength,
    /// `None` disables size-based eviction for this segment.
    pub max_size: Option<usize>,
    /// `None` disables write-TTL expiration.
    pub write_ttl_nanos: Option<u64>,
    /// `None` disables access-TTL expiration.
    pub access_ttl_nanos: Option<u64>,
    /// Capacity of the per-segment SOFT secondary registry.
    pub soft_capacity: usize,
    /// Capacity of the per-segment freed-node pool (see
    /// [`handle::Entry::reset`]); `0` disables pooling and every entry is
    /// individually allocated and freed.
    pub object_pool_capacity: usize,
}

pub struct Segment<K, V> {
    cfg: SegmentConfig,
    indexer: crate::indexer::Indexer<K, V>,
    recency: List<K, V>,
    write_order: List<K, V>,
    soft_registry: SoftRegistry<K, V>,
    reclaim: ReclaimQueue<K, V>,
    pending_promotions: Vec<NonNull<Entry<K, V>>>,
    pool: crossbeam::queue::ArrayQueue<Box<Entry<K, V>>>,
    len: usize,
}

// Safety: a `Segment` is only ever touched through its owning `Mutex`.
unsafe impl<K: Send, V: Send> Send for Segment<K, V> {}

impl<K: Eq, V: Eq> Segment<K, V> {
    pub fn new(cfg: SegmentConfig) -> Self {
        let soft_capacity = cfg.soft_capacity;
        let pool_capacity = cfg.object_pool_capacity.max(1);
        Self {
            cfg,
            indexer: crate::indexer::Indexer::new(),
            recency: List::new(LinkKind::Recency),
            write_order: List::new(LinkKind::WriteOrder),
            soft_registry: SoftRegistry::new(soft_capacity),
            reclaim: ReclaimQueue::new(),
            pending_promotions: Vec::new(),
            pool: crossbeam::queue::ArrayQueue::new(pool_capacity),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn tracks_soft(&self) -> bool {
        self.cfg.key_strength == Strength::Soft || self.cfg.value_strength == Strength::Soft
    }

    fn tracks_weak(&self) -> bool {
        self.cfg.key_strength == Strength::Weak || self.cfg.value_strength == Strength::Weak
    }

    /// Unlinks `ptr` from the indexer, both lists, the SOFT registry, and
    /// the promotion buffer, clearing its membership flags. Does not free
    /// the node.
    unsafe fn detach(&mut self, ptr: NonNull<Entry<K, V>>) {
        let flags = ptr.as_ref().flags();
        if flags.contains(EntryFlags::INDEXED) {
            self.indexer.remove(ptr.as_ref().hash, ptr);
        }
        if flags.contains(EntryFlags::IN_RECENCY) {
            self.recency.unlink(ptr);
        }
        if flags.contains(EntryFlags::IN_WRITE) {
            self.write_order.unlink(ptr);
        }
        ptr.as_ref()
            .remove_flags(EntryFlags::INDEXED | EntryFlags::IN_RECENCY | EntryFlags::IN_WRITE);
        self.soft_registry.forget(ptr);
        self.pending_promotions.retain(|&p| p != ptr);
    }

    /// Detaches and frees (or pools) `ptr`, returning the notification to
    /// fire for `cause`. `ptr` must not be used again after this call.
    unsafe fn remove_and_collect(&mut self, ptr: NonNull<Entry<K, V>>, cause: RemovalCause) -> Notification<K, V> {
        self.detach(ptr);
        self.len -= 1;
        let entry = ptr.as_ref();
        let key = entry.key.upgrade();
        let value = entry.value().upgrade();
        let boxed = Box::from_raw(ptr.as_ptr());
        if let Err(rejected) = self.pool.push(boxed) {
            drop(rejected);
        }
        Notification { key, value, cause }
    }

    fn touch_soft(&mut self, ptr: NonNull<Entry<K, V>>, out: &mut Vec<Notification<K, V>>) {
        if !self.tracks_soft() {
            return;
        }
        if let Some(evicted) = self.soft_registry.touch(ptr) {
            out.push(unsafe { self.remove_and_collect(evicted, RemovalCause::Collected) });
        }
    }

    /// The eviction/expiration engine run before (and, for size, after)
    /// every write, and on every access that may promote recency.
    fn run_cleanup(&mut self, now: u64) -> Vec<Notification<K, V>> {
        let mut out = Vec::new();

        for ptr in std::mem::take(&mut self.pending_promotions) {
            unsafe { self.recency.move_to_back(ptr) };
        }

        for ptr in self.reclaim.drain() {
            out.push(unsafe { self.remove_and_collect(ptr, RemovalCause::Collected) });
        }

        if self.tracks_weak() {
            let dead: Vec<_> = self
                .recency
                .iter()
                .filter(|&ptr| {
                    let e = unsafe { ptr.as_ref() };
                    !e.key.is_alive() || !e.value().is_alive()
                })
                .collect();
            for ptr in dead {
                out.push(unsafe { self.remove_and_collect(ptr, RemovalCause::Collected) });
            }
        }

        if let Some(ttl) = self.cfg.access_ttl_nanos {
            while let Some(front) = self.recency.front() {
                let stale = now.saturating_sub(unsafe { front.as_ref() }.access_time()) >= ttl;
                if !stale {
                    break;
                }
                out.push(unsafe { self.remove_and_collect(front, RemovalCause::Expired) });
            }
        }

        if let Some(ttl) = self.cfg.write_ttl_nanos {
            while let Some(front) = self.write_order.front() {
                let stale = now.saturating_sub(unsafe { front.as_ref() }.write_time()) >= ttl;
                if !stale {
                    break;
                }
                out.push(unsafe { self.remove_and_collect(front, RemovalCause::Expired) });
            }
        }

        out.extend(self.enforce_size());
        out
    }

    fn enforce_size(&mut self) -> Vec<Notification<K, V>> {
        let mut out = Vec::new();
        if let Some(max) = self.cfg.max_size {
            while self.len > max {
                match self.recency.front() {
                    Some(victim) => out.push(unsafe { self.remove_and_collect(victim, RemovalCause::Size) }),
                    None => break,
                }
            }
        }
        out
    }

    pub fn get(&mut self, hash: u64, key: &Arc<K>, now: u64) -> (Option<Arc<V>>, Vec<Notification<K, V>>) {
        let mut notifications = self.run_cleanup(now);
        let Some(ptr) = self.indexer.find(hash, self.cfg.key_strength, key) else {
            return (None, notifications);
        };
        let entry = unsafe { ptr.as_ref() };
        let Some(value) = entry.value().upgrade() else {
            self.reclaim.push(ptr);
            return (None, notifications);
        };
        entry.set_access_time(now);
        self.pending_promotions.push(ptr);
        self.touch_soft(ptr, &mut notifications);
        (Some(value), notifications)
    }

    pub fn put(
        &mut self,
        hash: u64,
        key: Arc<K>,
        value: Arc<V>,
        only_if_absent: bool,
        now: u64,
    ) -> (Option<Arc<V>>, Vec<Notification<K, V>>) {
        let mut notifications = self.run_cleanup(now);

        if let Some(ptr) = self.indexer.find(hash, self.cfg.key_strength, &key) {
            let entry = unsafe { ptr.as_ref() };
            let previous = entry.value().upgrade();
            if only_if_absent {
                return (previous, notifications);
            }
            entry.set_value(StrengthRef::new(self.cfg.value_strength, value));
            entry.set_write_time(now);
            unsafe { self.write_order.move_to_back(ptr) };
            self.touch_soft(ptr, &mut notifications);
            if let Some(prev) = &previous {
                notifications.push(Notification { key: Some(key), value: Some(prev.clone()), cause: RemovalCause::Replaced });
            }
            notifications.extend(self.enforce_size());
            return (previous, notifications);
        }

        let key_ref = StrengthRef::new(self.cfg.key_strength, key);
        let value_ref = StrengthRef::new(self.cfg.value_strength, value);
        let entry_box = match self.pool.pop() {
            Some(mut reused) => {
                reused.reset(hash, key_ref, value_ref, now);
                reused
            }
            None => Entry::new(hash, key_ref, value_ref, now),
        };
        entry_box.insert_flags(EntryFlags::INDEXED | EntryFlags::IN_RECENCY | EntryFlags::IN_WRITE);
        let ptr = NonNull::from(Box::leak(entry_box));
        unsafe {
            self.indexer.insert(hash, ptr);
            self.recency.push_back(ptr);
            self.write_order.push_back(ptr);
        }
        self.len += 1;
        self.touch_soft(ptr, &mut notifications);
        notifications.extend(self.enforce_size());
        (None, notifications)
    }

    pub fn remove(&mut self, hash: u64, key: &Arc<K>, now: u64) -> (Option<Arc<V>>, Vec<Notification<K, V>>) {
        let mut notifications = self.run_cleanup(now);
        match self.indexer.find(hash, self.cfg.key_strength, key) {
            Some(ptr) => {
                let notification = unsafe { self.remove_and_collect(ptr, RemovalCause::Explicit) };
                let value = notification.value.clone();
                notifications.push(notification);
                (value, notifications)
            }
            None => (None, notifications),
        }
    }

    pub fn remove_if_eq(&mut self, hash: u64, key: &Arc<K>, expected: &Arc<V>, now: u64) -> (bool, Vec<Notification<K, V>>) {
        let mut notifications = self.run_cleanup(now);
        if let Some(ptr) = self.indexer.find(hash, self.cfg.key_strength, key) {
            let entry = unsafe { ptr.as_ref() };
            if let Some(current) = entry.value().upgrade() {
                if current == *expected {
                    notifications.push(unsafe { self.remove_and_collect(ptr, RemovalCause::Explicit) });
                    return (true, notifications);
                }
            }
        }
        (false, notifications)
    }

    pub fn replace(&mut self, hash: u64, key: &Arc<K>, new_value: Arc<V>, now: u64) -> (Option<Arc<V>>, Vec<Notification<K, V>>) {
        let mut notifications = self.run_cleanup(now);
        let Some(ptr) = self.indexer.find(hash, self.cfg.key_strength, key) else {
            return (None, notifications);
        };
        let entry = unsafe { ptr.as_ref() };
        let previous = entry.value().upgrade();
        entry.set_value(StrengthRef::new(self.cfg.value_strength, new_value));
        entry.set_write_time(now);
        unsafe { self.write_order.move_to_back(ptr) };
        self.touch_soft(ptr, &mut notifications);
        if let Some(prev) = &previous {
            notifications.push(Notification { key: Some(key.clone()), value: Some(prev.clone()), cause: RemovalCause::Replaced });
        }
        notifications.extend(self.enforce_size());
        (previous, notifications)
    }

    pub fn replace_if_eq(
        &mut self,
        hash: u64,
        key: &Arc<K>,
        expected: &Arc<V>,
        new_value: Arc<V>,
        now: u64,
    ) -> (bool, Vec<Notification<K, V>>) {
        let mut notifications = self.run_cleanup(now);
        let Some(ptr) = self.indexer.find(hash, self.cfg.key_strength, key) else {
            return (false, notifications);
        };
        let entry = unsafe { ptr.as_ref() };
        let Some(current) = entry.value().upgrade() else {
            return (false, notifications);
        };
        if current != *expected {
            return (false, notifications);
        }
        entry.set_value(StrengthRef::new(self.cfg.value_strength, new_value));
        entry.set_write_time(now);
        unsafe { self.write_order.move_to_back(ptr) };
        self.touch_soft(ptr, &mut notifications);
        notifications.push(Notification { key: Some(key.clone()), value: Some(current), cause: RemovalCause::Replaced });
        notifications.extend(self.enforce_size());
        (true, notifications)
    }

    pub fn contains_key(&mut self, hash: u64, key: &Arc<K>, now: u64) -> (bool, Vec<Notification<K, V>>) {
        let (value, notifications) = self.get(hash, key, now);
        (value.is_some(), notifications)
    }

    /// Weakly consistent: walks the recency list as it stands right now,
    /// dead SOFT/WEAK entries included (a caller racing reclamation may
    /// see `true` for an entry about to disappear).
    pub fn contains_value(&self, probe: &Arc<V>) -> bool {
        self.recency.iter().any(|ptr| {
            let entry = unsafe { ptr.as_ref() };
            crate::strength::matches(self.cfg.value_strength, &entry.value(), probe)
        })
    }

    /// Weakly consistent snapshot for iteration: walks the recency list as
    /// it stands right now, skipping entries whose TTL has already elapsed
    /// or whose SOFT/WEAK reference has gone dead, without unlinking them
    /// (that's left to the next `run_cleanup`).
    pub fn snapshot(&self, now: u64) -> Vec<(Arc<K>, Arc<V>)> {
        self.recency
            .iter()
            .filter_map(|ptr| {
                let entry = unsafe { ptr.as_ref() };
                if let Some(ttl) = self.cfg.access_ttl_nanos {
                    if now.saturating_sub(entry.access_time()) >= ttl {
                        return None;
                    }
                }
                if let Some(ttl) = self.cfg.write_ttl_nanos {
                    if now.saturating_sub(entry.write_time()) >= ttl {
                        return None;
                    }
                }
                let key = entry.key.upgrade()?;
                let value = entry.value().upgrade()?;
                Some((key, value))
            })
            .collect()
    }

    pub fn clear(&mut self) -> Vec<Notification<K, V>> {
        let ptrs = self.indexer.clear();
        self.recency = List::new(LinkKind::Recency);
        self.write_order = List::new(LinkKind::WriteOrder);
        self.soft_registry.clear();
        self.reclaim.drain();
        self.pending_promotions.clear();
        self.len = 0;
        ptrs.into_iter()
            .map(|ptr| {
                let entry = unsafe { ptr.as_ref() };
                let key = entry.key.upgrade();
                let value = entry.value().upgrade();
                unsafe { handle::drop_entry(ptr) };
                Notification { key, value, cause: RemovalCause::Explicit }
            })
            .collect()
    }

    /// Runs the cleanup pass with no associated read/write, for an
    /// out-of-line cleanup executor (spec.md §5 "optional cleanup
    /// executor").
    pub fn maintain(&mut self, now: u64) -> Vec<Notification<K, V>> {
        self.run_cleanup(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SegmentConfig {
        SegmentConfig {
            key_strength: Strength::Strong,
            value_strength: Strength::Strong,
            max_size: None,
            write_ttl_nanos: None,
            access_ttl_nanos: None,
            soft_capacity: 16,
            object_pool_capacity: 4,
        }
    }

    fn segment() -> Segment<u64, String> {
        Segment::new(cfg())
    }

    fn put(seg: &mut Segment<u64, String>, k: u64, v: &str) -> Option<Arc<String>> {
        seg.put(k, Arc::new(k), Arc::new(v.to_string()), false, 0).0
    }

    fn get(seg: &mut Segment<u64, String>, k: u64) -> Option<Arc<String>> {
        seg.get(k, &Arc::new(k), 0).0
    }

    #[test_log::test]
    fn put_then_get_then_remove() {
        let mut seg = segment();
        assert_eq!(put(&mut seg, 1, "a"), None);
        assert_eq!(get(&mut seg, 1).as_deref().map(String::as_str), Some("a"));
        let (removed, notifications) = seg.remove(1, &Arc::new(1u64), 0);
        assert_eq!(removed.as_deref().map(String::as_str), Some("a"));
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].cause, RemovalCause::Explicit);
        assert_eq!(get(&mut seg, 1), None);
    }

    #[test_log::test]
    fn put_replaces_and_fires_replaced() {
        let mut seg = segment();
        put(&mut seg, 1, "a");
        let (previous, notifications) = seg.put(1, Arc::new(1u64), Arc::new("b".to_string()), false, 0);
        assert_eq!(previous.as_deref().map(String::as_str), Some("a"));
        assert!(notifications.iter().any(|n| n.cause == RemovalCause::Replaced));
        assert_eq!(get(&mut seg, 1).as_deref().map(String::as_str), Some("b"));
    }

    #[test_log::test]
    fn put_if_absent_does_not_overwrite() {
        let mut seg = segment();
        put(&mut seg, 1, "a");
        let (previous, notifications) = seg.put(1, Arc::new(1u64), Arc::new("b".to_string()), true, 0);
        assert_eq!(previous.as_deref().map(String::as_str), Some("a"));
        assert!(notifications.is_empty());
        assert_eq!(get(&mut seg, 1).as_deref().map(String::as_str), Some("a"));
    }

    #[test_log::test]
    fn size_zero_evicts_every_put() {
        let mut cfg = cfg();
        cfg.max_size = Some(0);
        let mut seg = Segment::new(cfg);
        let (_, n1) = seg.put(1, Arc::new(1u64), Arc::new("a".to_string()), false, 0);
        let (_, n2) = seg.put(2, Arc::new(2u64), Arc::new("b".to_string()), false, 0);
        assert_eq!(seg.len(), 0);
        assert_eq!(n1.iter().filter(|n| n.cause == RemovalCause::Size).count(), 1);
        assert_eq!(n2.iter().filter(|n| n.cause == RemovalCause::Size).count(), 1);
    }

    #[test_log::test]
    fn max_size_evicts_lru_head() {
        let mut cfg = cfg();
        cfg.max_size = Some(2);
        let mut seg = Segment::new(cfg);
        put(&mut seg, 1, "a");
        put(&mut seg, 2, "b");
        // touch 1 so 2 becomes the least-recently-used
        get(&mut seg, 1);
        let (_, notifications) = seg.put(3, Arc::new(3u64), Arc::new("c".to_string()), false, 0);
        assert!(notifications.iter().any(|n| n.cause == RemovalCause::Size));
        assert_eq!(get(&mut seg, 2), None);
        assert!(get(&mut seg, 1).is_some());
        assert!(get(&mut seg, 3).is_some());
    }

    #[test_log::test]
    fn write_ttl_expires_after_elapsed() {
        let mut cfg = cfg();
        cfg.write_ttl_nanos = Some(100);
        let mut seg = Segment::new(cfg);
        seg.put(1, Arc::new(1u64), Arc::new("a".to_string()), false, 0);
        assert!(seg.get(1, &Arc::new(1u64), 50).0.is_some());
        let (value, notifications) = seg.get(1, &Arc::new(1u64), 200);
        assert!(value.is_none());
        assert!(notifications.iter().any(|n| n.cause == RemovalCause::Expired));
    }

    #[test_log::test]
    fn access_ttl_is_refreshed_by_reads() {
        let mut cfg = cfg();
        cfg.access_ttl_nanos = Some(100);
        let mut seg = Segment::new(cfg);
        seg.put(1, Arc::new(1u64), Arc::new("a".to_string()), false, 0);
        assert!(seg.get(1, &Arc::new(1u64), 90).0.is_some());
        // still alive at t=150 since the read at t=90 refreshed access_time
        assert!(seg.get(1, &Arc::new(1u64), 150).0.is_some());
        assert!(seg.get(1, &Arc::new(1u64), 260).0.is_none());
    }

    #[test_log::test]
    fn remove_if_eq_only_removes_matching_value() {
        let mut seg = segment();
        put(&mut seg, 1, "a");
        let (removed, _) = seg.remove_if_eq(1, &Arc::new(1u64), &Arc::new("b".to_string()), 0);
        assert!(!removed);
        assert!(get(&mut seg, 1).is_some());
        let (removed, notifications) = seg.remove_if_eq(1, &Arc::new(1u64), &Arc::new("a".to_string()), 0);
        assert!(removed);
        assert_eq!(notifications[0].cause, RemovalCause::Explicit);
        assert!(get(&mut seg, 1).is_none());
    }

    #[test_log::test]
    fn replace_if_eq_only_replaces_matching_value() {
        let mut seg = segment();
        put(&mut seg, 1, "a");
        let (replaced, _) = seg.replace_if_eq(1, &Arc::new(1u64), &Arc::new("x".to_string()), Arc::new("b".to_string()), 0);
        assert!(!replaced);
        let (replaced, notifications) = seg.replace_if_eq(1, &Arc::new(1u64), &Arc::new("a".to_string()), Arc::new("b".to_string()), 0);
        assert!(replaced);
        assert!(notifications.iter().any(|n| n.cause == RemovalCause::Replaced));
        assert_eq!(get(&mut seg, 1).as_deref().map(String::as_str), Some("b"));
    }

    #[test_log::test]
    fn clear_fires_explicit_for_every_entry() {
        let mut seg = segment();
        put(&mut seg, 1, "a");
        put(&mut seg, 2, "b");
        let notifications = seg.clear();
        assert_eq!(notifications.len(), 2);
        assert!(notifications.iter().all(|n| n.cause == RemovalCause::Explicit));
        assert_eq!(seg.len(), 0);
    }

    #[test_log::test]
    fn object_pool_reuses_freed_nodes() {
        let mut seg = segment();
        put(&mut seg, 1, "a");
        seg.remove(1, &Arc::new(1u64), 0);
        // the freed node should come back out of the pool rather than a
        // fresh allocation; behavior is observable only indirectly, but this
        // at least exercises the reset() path without UB under miri-less CI.
        put(&mut seg, 2, "b");
        assert_eq!(get(&mut seg, 2).as_deref().map(String::as_str), Some("b"));
    }

    #[test_log::test]
    fn weak_key_identity_equality() {
        let mut cfg = cfg();
        cfg.key_strength = Strength::Weak;
        let mut seg = Segment::new(cfg);
        let k1 = Arc::new(1u64);
        seg.put(seed_hash(&k1), k1.clone(), Arc::new("v".to_string()), false, 0);
        let k2 = Arc::new(1u64); // structurally equal, distinct allocation
        assert!(seg.get(seed_hash(&k2), &k2, 0).0.is_none());
        assert!(seg.get(seed_hash(&k1), &k1, 0).0.is_some());
    }

    fn seed_hash(k: &Arc<u64>) -> u64 {
        **k
    }
}

impl<K: Eq, V: Eq> Drop for Segment<K, V> {
    fn drop(&mut self) {
        let _ = self.clear();
    }
}
