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

//! Models the memory-pressure reclamation that a real garbage collector
//! would perform on `SoftReference`/`WeakReference`-held entries, since
//! Rust's `Arc`/`Weak` otherwise never reclaim on their own.
//!
//! * SOFT entries are additionally tracked in a small bounded secondary
//!   LRU (`SoftRegistry`) sized independently of the segment's main
//!   capacity (`soft_max_size` in the builder). Pushing past that bound
//!   "collects" the oldest SOFT entry: it is queued here for the segment
//!   to unlink and notify on with [`crate::listener::RemovalCause::Collected`].
//! * WEAK entries need no registry — their liveness is just
//!   `Weak::upgrade().is_some()`, checked opportunistically by the segment
//!   during lookups and swept during `run_cleanup`.

use std::{collections::VecDeque, ptr::NonNull};

use crate::handle::Entry;

/// Tracks SOFT-strength entries in insertion/touch order and yields the
/// oldest one once the registry exceeds its configured bound.
pub struct SoftRegistry<K, V> {
    order: VecDeque<NonNull<Entry<K, V>>>,
    max_len: usize,
}

impl<K, V> SoftRegistry<K, V> {
    pub fn new(max_len: usize) -> Self {
        Self { order: VecDeque::new(), max_len }
    }

    /// Registers a newly-inserted or just-touched SOFT entry, moving it to
    /// the most-recently-touched end if already present, and returns an
    /// entry to collect if the registry is now over its bound.
    pub fn touch(&mut self, ptr: NonNull<Entry<K, V>>) -> Option<NonNull<Entry<K, V>>> {
        self.forget(ptr);
        self.order.push_back(ptr);
        if self.max_len == 0 || self.order.len() > self.max_len {
            return self.order.pop_front();
        }
        None
    }

    /// Removes `ptr` from the registry ahead of an explicit removal,
    /// replacement, or expiration, so it isn't later double-collected.
    pub fn forget(&mut self, ptr: NonNull<Entry<K, V>>) {
        if let Some(pos) = self.order.iter().position(|&p| p == ptr) {
            self.order.remove(pos);
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A FIFO of entries awaiting reclamation bookkeeping (unlinking from the
/// indexer/lists and a removal-listener call), drained by the owning
/// segment's `run_cleanup`.
///
/// Backed by a lock-free `crossbeam` queue rather than the segment's own
/// mutex: spec.md §5 describes reclamation queues as thread-safe
/// concurrent FIFOs in their own right, independent of whatever guards the
/// table they feed into.
///
/// Kept separate from `SoftRegistry` so WEAK reclamations discovered
/// during a lookup can be queued the same way without a registry entry to
/// remove first.
pub struct ReclaimQueue<K, V> {
    pending: crossbeam::queue::SegQueue<NonNull<Entry<K, V>>>,
}

impl<K, V> ReclaimQueue<K, V> {
    pub fn new() -> Self {
        Self { pending: crossbeam::queue::SegQueue::new() }
    }

    pub fn push(&mut self, ptr: NonNull<Entry<K, V>>) {
        self.pending.push(ptr);
    }

    pub fn drain(&mut self) -> Vec<NonNull<Entry<K, V>>> {
        let mut drained = Vec::new();
        while let Some(ptr) = self.pending.pop() {
            drained.push(ptr);
        }
        drained
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
