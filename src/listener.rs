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

//! Removal notification: a cache-wide hook invoked whenever an entry
//! leaves the table, and the reason it left.

use std::{panic::AssertUnwindSafe, sync::Arc};

/// Why an entry was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalCause {
    /// `remove`/`invalidate` was called explicitly.
    Explicit,
    /// An `insert`/compute overwrote an existing mapping for the key.
    Replaced,
    /// A SOFT or WEAK entry's referent was reclaimed (see
    /// [`crate::reclaim`]).
    Collected,
    /// The entry's TTL (write- or access-based) had elapsed.
    Expired,
    /// The entry was evicted to keep the cache within its size bound.
    Size,
}

impl RemovalCause {
    /// Whether this cause reflects the entry having actually been in use,
    /// as opposed to the cache proactively discarding it. Mirrors the
    /// eviction-vs-removal distinction spec.md draws in its listener
    /// section.
    pub fn was_evicted(&self) -> bool {
        matches!(self, RemovalCause::Collected | RemovalCause::Expired | RemovalCause::Size)
    }
}

/// A removal event collected under a segment's lock and fired by the
/// caller once the lock has been released, so no user code ever runs
/// while a segment is held.
///
/// `key`/`value` are `None` only for a [`RemovalCause::Collected`] entry
/// whose reference had already gone dead by the time the cause was
/// determined (spec's "the corresponding argument is absent").
pub struct Notification<K, V> {
    pub key: Option<Arc<K>>,
    pub value: Option<Arc<V>>,
    pub cause: RemovalCause,
}

/// Invoked once per entry removal, outside any segment lock. `key`/`value`
/// are `None` only for a [`RemovalCause::Collected`] entry whose reference
/// had already gone dead. Implementors must not call back into the cache
/// that invoked them — doing so while holding no lock is safe, but
/// reentrant eviction storms are the caller's problem to avoid.
pub trait RemovalListener<K, V>: Send + Sync {
    fn on_removal(&self, key: Option<&Arc<K>>, value: Option<&Arc<V>>, cause: RemovalCause);
}

/// The cache's fallback listener: logs at `debug` and otherwise does
/// nothing. Installed whenever the builder isn't given a listener of its
/// own.
#[derive(Default)]
pub struct DefaultRemovalListener;

impl<K, V> RemovalListener<K, V> for DefaultRemovalListener {
    fn on_removal(&self, _key: Option<&Arc<K>>, _value: Option<&Arc<V>>, cause: RemovalCause) {
        tracing::debug!(?cause, "cache entry removed");
    }
}

/// Fires `notification` against `listener`, catching any panic so a
/// misbehaving listener can't poison the segment lock or abort an
/// eviction sweep.
pub fn notify<K, V>(listener: &dyn RemovalListener<K, V>, notification: &Notification<K, V>) {
    let Notification { key, value, cause } = notification;
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener.on_removal(key.as_ref(), value.as_ref(), *cause)));
    if let Err(payload) = result {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(panic = %msg, "removal listener panicked");
    }
}
