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

//! The heap node backing one cache entry.
//!
//! An `Entry` is allocated once on insertion and freed once it has left
//! both the indexer and every list it was linked into. It is never moved:
//! everything that points at it does so through a `NonNull<Entry<K, V>>`,
//! which is why the two [`Links`] pairs live inline rather than behind a
//! `Box` per list.

use std::{
    ptr::NonNull,
    sync::atomic::{AtomicU64, AtomicU8, Ordering},
};

use parking_lot::Mutex;

use crate::{
    list::{LinkKind, Links},
    strength::StrengthRef,
};

bitflags::bitflags! {
    /// Membership/lifecycle flags for an `Entry`, read under the owning
    /// segment's lock except where noted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryFlags: u8 {
        /// Present in the indexer's hash table.
        const INDEXED      = 0b0000_0001;
        /// Linked into the segment's recency list.
        const IN_RECENCY   = 0b0000_0010;
        /// Linked into the segment's write-order list.
        const IN_WRITE     = 0b0000_0100;
    }
}

/// One cache entry: a key/value pair plus every piece of bookkeeping the
/// segment needs to place it in the indexer, the recency list, and the
/// write-order list, and to decide when it has expired.
pub struct Entry<K, V> {
    pub hash: u64,
    pub key: StrengthRef<K>,
    value: Mutex<StrengthRef<V>>,

    /// Nanoseconds (per the configured [`crate::ticker::Ticker`]) at which
    /// this entry was last written (inserted or replaced).
    write_time: AtomicU64,
    /// Nanoseconds at which this entry was last read, used by
    /// expire-after-access.
    access_time: AtomicU64,

    flags: AtomicU8,

    recency_links: Links<K, V>,
    write_links: Links<K, V>,
}

impl<K, V> Entry<K, V> {
    pub fn new(hash: u64, key: StrengthRef<K>, value: StrengthRef<V>, now: u64) -> Box<Self> {
        Box::new(Self {
            hash,
            key,
            value: Mutex::new(value),
            write_time: AtomicU64::new(now),
            access_time: AtomicU64::new(now),
            flags: AtomicU8::new(0),
            recency_links: Links::default(),
            write_links: Links::default(),
        })
    }

    /// Re-initializes a node pulled back out of the segment's object pool
    /// (see [`crate::reclaim`] / `CacheConfig::object_pool_capacity`)
    /// instead of allocating a fresh `Box`. The node must already be
    /// fully unlinked — its link fields are left untouched since they're
    /// cleared by `detach` before the node is returned to the pool.
    pub fn reset(&mut self, hash: u64, key: StrengthRef<K>, value: StrengthRef<V>, now: u64) {
        self.hash = hash;
        self.key = key;
        *self.value.get_mut() = value;
        self.write_time = AtomicU64::new(now);
        self.access_time = AtomicU64::new(now);
        self.flags = AtomicU8::new(0);
        debug_assert!(!self.recency_links.is_linked());
        debug_assert!(!self.write_links.is_linked());
    }

    pub fn links(&self, kind: LinkKind) -> &Links<K, V> {
        match kind {
            LinkKind::Recency => &self.recency_links,
            LinkKind::WriteOrder => &self.write_links,
        }
    }

    /// # Safety
    /// The caller must hold the owning segment's lock; links are not
    /// independently synchronized.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn links_mut(&self, kind: LinkKind) -> &mut Links<K, V> {
        let ptr = match kind {
            LinkKind::Recency => &self.recency_links,
            LinkKind::WriteOrder => &self.write_links,
        } as *const Links<K, V> as *mut Links<K, V>;
        &mut *ptr
    }

    pub fn flags(&self) -> EntryFlags {
        EntryFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn insert_flags(&self, flags: EntryFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub fn remove_flags(&self, flags: EntryFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub fn write_time(&self) -> u64 {
        self.write_time.load(Ordering::Acquire)
    }

    pub fn set_write_time(&self, now: u64) {
        self.write_time.store(now, Ordering::Release);
    }

    pub fn access_time(&self) -> u64 {
        self.access_time.load(Ordering::Acquire)
    }

    pub fn set_access_time(&self, now: u64) {
        self.access_time.store(now, Ordering::Release);
    }

    pub fn value(&self) -> StrengthRef<V> {
        self.value.lock().clone()
    }

    pub fn set_value(&self, value: StrengthRef<V>) {
        *self.value.lock() = value;
    }
}

/// Frees an `Entry` that has already been unlinked from every list and the
/// indexer and has no remaining external references.
///
/// # Safety
/// `ptr` must be uniquely owned at the point of the call: nothing else may
/// dereference it afterward.
pub unsafe fn drop_entry<K, V>(ptr: NonNull<Entry<K, V>>) {
    drop(Box::from_raw(ptr.as_ptr()));
}
