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

//! A hash-bucket chaining index from key hash to the live [`Entry`] nodes
//! that hash to it, local to one segment.
//!
//! Actual key comparison (content-equal for STRONG, identity for
//! SOFT/WEAK) happens one level up in `segment.rs` via
//! [`crate::strength::matches`] — the indexer only groups candidates by
//! hash and leaves disambiguation to the caller, same as a textbook
//! separate-chaining table.

use std::{ptr::NonNull, sync::Arc};

use hashbrown::HashMap;

use crate::{
    handle::Entry,
    strength::{self, Strength},
};

/// Groups entries by hash bucket. One instance per segment.
pub struct Indexer<K, V> {
    buckets: HashMap<u64, Vec<NonNull<Entry<K, V>>>>,
    len: usize,
}

impl<K, V> Default for Indexer<K, V> {
    fn default() -> Self {
        Self { buckets: HashMap::new(), len: 0 }
    }
}

impl<K: Eq, V> Indexer<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finds the entry whose key matches `probe` under `strength`'s
    /// equivalence, among the bucket for `hash`.
    pub fn find(&self, hash: u64, strength: Strength, probe: &Arc<K>) -> Option<NonNull<Entry<K, V>>> {
        let bucket = self.buckets.get(&hash)?;
        bucket.iter().copied().find(|&ptr| {
            let entry = unsafe { ptr.as_ref() };
            strength::matches(strength, &entry.key, probe)
        })
    }

    /// Inserts `ptr` into its hash bucket. Does not check for an existing
    /// equivalent key — callers must `find` first and decide how to
    /// handle a collision (replace vs reject).
    ///
    /// # Safety
    /// `ptr` must not already be indexed.
    pub unsafe fn insert(&mut self, hash: u64, ptr: NonNull<Entry<K, V>>) {
        self.buckets.entry(hash).or_default().push(ptr);
        self.len += 1;
    }

    /// Removes `ptr` from its hash bucket, dropping the bucket entirely
    /// once empty so the map doesn't accumulate dead buckets.
    ///
    /// # Safety
    /// `ptr` must currently be indexed under `hash`.
    pub unsafe fn remove(&mut self, hash: u64, ptr: NonNull<Entry<K, V>>) {
        if let Some(bucket) = self.buckets.get_mut(&hash) {
            if let Some(pos) = bucket.iter().position(|&p| p == ptr) {
                bucket.swap_remove(pos);
            }
            if bucket.is_empty() {
                self.buckets.remove(&hash);
            }
        }
        self.len -= 1;
    }

    pub fn clear(&mut self) -> Vec<NonNull<Entry<K, V>>> {
        self.len = 0;
        self.buckets.drain().flat_map(|(_, v)| v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strength::StrengthRef;

    fn entry(hash: u64, key: u64) -> NonNull<Entry<u64, u64>> {
        let boxed = Entry::new(hash, StrengthRef::new(Strength::Strong, Arc::new(key)), StrengthRef::new(Strength::Strong, Arc::new(key)), 0);
        NonNull::from(Box::leak(boxed))
    }

    #[test_log::test]
    fn find_disambiguates_collisions_by_key() {
        let mut indexer = Indexer::<u64, u64>::new();
        let a = entry(1, 10);
        let b = entry(1, 20); // same hash bucket, different key
        unsafe {
            indexer.insert(1, a);
            indexer.insert(1, b);
        }
        assert_eq!(indexer.len(), 2);
        let found = indexer.find(1, Strength::Strong, &Arc::new(20u64)).unwrap();
        assert_eq!(unsafe { found.as_ref().key.upgrade() }.as_deref(), Some(&20u64));
        unsafe {
            drop(Box::from_raw(a.as_ptr()));
            drop(Box::from_raw(b.as_ptr()));
        }
    }

    #[test_log::test]
    fn remove_drops_empty_buckets() {
        let mut indexer = Indexer::<u64, u64>::new();
        let a = entry(1, 10);
        unsafe {
            indexer.insert(1, a);
            indexer.remove(1, a);
        }
        assert!(indexer.is_empty());
        assert!(indexer.find(1, Strength::Strong, &Arc::new(10u64)).is_none());
        unsafe { drop(Box::from_raw(a.as_ptr())) };
    }
}
