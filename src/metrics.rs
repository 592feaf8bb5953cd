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

//! Hit/miss/eviction counters. Out of scope for the cache core per
//! spec.md §1 ("excludes... metrics/observability beyond basic
//! hit/miss/eviction counters") but kept as the minimal external contract
//! that scope line still promises: every cache exposes a cheap,
//! lock-free snapshot of its own traffic.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::listener::RemovalCause;

/// A cache's hit/miss/eviction counters. Cheap to read (`Relaxed` loads)
/// and cheap to update (one `fetch_add` per operation, no contention with
/// the segment locks).
#[derive(Default)]
pub struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    explicit_removals: AtomicU64,
    replaced: AtomicU64,
    expired: AtomicU64,
    collected: AtomicU64,
    evicted_by_size: AtomicU64,
}

impl Metrics {
    pub(crate) fn record_get(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_insertion(&self) {
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self, cause: RemovalCause) {
        let counter = match cause {
            RemovalCause::Explicit => &self.explicit_removals,
            RemovalCause::Replaced => &self.replaced,
            RemovalCause::Expired => &self.expired,
            RemovalCause::Collected => &self.collected,
            RemovalCause::Size => &self.evicted_by_size,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hit_count() as f64;
        let total = hits + self.miss_count() as f64;
        if total == 0.0 {
            1.0
        } else {
            hits / total
        }
    }

    pub fn insertion_count(&self) -> u64 {
        self.insertions.load(Ordering::Relaxed)
    }

    pub fn eviction_count(&self) -> u64 {
        self.expired.load(Ordering::Relaxed) + self.collected.load(Ordering::Relaxed) + self.evicted_by_size.load(Ordering::Relaxed)
    }

    pub fn removal_count(&self, cause: RemovalCause) -> u64 {
        match cause {
            RemovalCause::Explicit => self.explicit_removals.load(Ordering::Relaxed),
            RemovalCause::Replaced => self.replaced.load(Ordering::Relaxed),
            RemovalCause::Expired => self.expired.load(Ordering::Relaxed),
            RemovalCause::Collected => self.collected.load(Ordering::Relaxed),
            RemovalCause::Size => self.evicted_by_size.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn hit_rate_is_one_with_no_traffic_yet() {
        let m = Metrics::default();
        assert_eq!(m.hit_rate(), 1.0);
    }

    #[test_log::test]
    fn hit_rate_reflects_recorded_gets() {
        let m = Metrics::default();
        m.record_get(true);
        m.record_get(true);
        m.record_get(false);
        assert_eq!(m.hit_count(), 2);
        assert_eq!(m.miss_count(), 1);
        assert!((m.hit_rate() - (2.0 / 3.0)).abs() < f64::EPSILON);
    }

    #[test_log::test]
    fn removal_counts_are_tracked_per_cause() {
        let m = Metrics::default();
        m.record_removal(RemovalCause::Size);
        m.record_removal(RemovalCause::Size);
        m.record_removal(RemovalCause::Expired);
        assert_eq!(m.removal_count(RemovalCause::Size), 2);
        assert_eq!(m.removal_count(RemovalCause::Expired), 1);
        assert_eq!(m.removal_count(RemovalCause::Explicit), 0);
        assert_eq!(m.eviction_count(), 3);
    }
}
