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

//! The computing layer: `get` that computes on miss, with at-most-once
//! semantics per key even when many callers race on the same key.
//!
//! Realized the way the teacher's `cache.rs`/`generic.rs` realize their
//! own `Entry` enum (`Hit` / `Wait` / `Miss`): a waiter list keyed by the
//! in-flight key, drained by whichever caller's `tokio::spawn`ed
//! computation finishes first. Unlike the teacher, the underlying
//! storage here is a plain [`Cache`] — the in-flight bookkeeping lives
//! beside it rather than as a pending state inside the segment itself,
//! since a compute function is user async code that must never run under
//! a segment lock.
//!
//! The first caller for a key ("the leader") spawns the computation as a
//! detached `tokio` task and then waits on its own oneshot channel
//! exactly like every other waiter — so dropping the leader's `get`
//! future cancels only that caller's wait, never the computation itself
//! (spec.md §5: "the computer continues and publishes for other
//! waiters").

use std::{collections::HashMap, hash::Hash, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::{
    cache::Cache,
    error::{CacheError, NullComputation, Result},
};

type SharedOutcome<V> = std::result::Result<Arc<V>, Arc<CacheError>>;
type Waiters<K, V> = Mutex<HashMap<Arc<K>, Vec<oneshot::Sender<SharedOutcome<V>>>>>;

struct Inner<K, V, F> {
    cache: Cache<K, V>,
    compute: F,
    waiters: Waiters<K, V>,
}

/// A [`Cache`] paired with a fallible async compute function invoked on a
/// miss. `get` never returns "absent": it returns the computed value or
/// propagates the compute function's failure (spec.md §6).
pub struct ComputingCache<K, V, F> {
    inner: Arc<Inner<K, V, F>>,
}

impl<K, V, F> Clone for ComputingCache<K, V, F> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<K, V, F, Fut> ComputingCache<K, V, F>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Send + Sync + 'static,
    F: Fn(Arc<K>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<Arc<V>, Box<dyn std::error::Error + Send + Sync>>> + Send + 'static,
{
    pub(crate) fn new(cache: Cache<K, V>, compute: F) -> Self {
        Self { inner: Arc::new(Inner { cache, compute, waiters: Mutex::new(HashMap::new()) }) }
    }

    /// Returns the cached value for `key`, computing it via the builder's
    /// compute function on a miss. Concurrent callers for the same key
    /// observe the computation exactly once (property 6); a `put` that
    /// races an in-flight computation for the same key wins, and every
    /// waiter observes the `put`'s value instead (property 7).
    pub async fn get(&self, key: Arc<K>) -> Result<Arc<V>> {
        if let Some(value) = self.inner.cache.get(&key) {
            return Ok(value);
        }

        let (rx, is_leader) = {
            let mut waiters = self.inner.waiters.lock();
            let (tx, rx) = oneshot::channel();
            match waiters.get_mut(&key) {
                Some(list) => {
                    list.push(tx);
                    (rx, false)
                }
                None => {
                    waiters.insert(key.clone(), vec![tx]);
                    (rx, true)
                }
            }
        };

        if is_leader {
            let inner = self.inner.clone();
            let leader_key = key.clone();
            tokio::spawn(async move { run_computation(inner, leader_key).await });
        }

        rx.await
            .map_err(|_| CacheError::Cancelled)?
            .map_err(|cause| CacheError::shared_computation(&cause))
    }

    pub fn inner(&self) -> &Cache<K, V> {
        &self.inner.cache
    }
}

async fn run_computation<K, V, F, Fut>(inner: Arc<Inner<K, V, F>>, key: Arc<K>)
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Send + Sync + 'static,
    F: Fn(Arc<K>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<Arc<V>, Box<dyn std::error::Error + Send + Sync>>> + Send + 'static,
{
    // Re-probe: an external `put` may have landed while this task was
    // being scheduled.
    if let Some(value) = inner.cache.get(&key) {
        publish(&inner, &key, Ok(value));
        return;
    }

    let polled = AssertUnwindSafe((inner.compute)(key.clone())).catch_unwind().await;
    let outcome: std::result::Result<Arc<V>, CacheError> = match polled {
        Ok(Ok(value)) => {
            // An external `put` during computation wins over this result.
            let winner = inner.cache.insert_if_absent(key.clone(), value.clone());
            Ok(winner.unwrap_or(value))
        }
        Ok(Err(cause)) => Err(CacheError::computation(BoxedError(cause))),
        Err(_panic) => Err(CacheError::computation(NullComputation)),
    };
    publish(&inner, &key, outcome);
}

fn publish<K, V, F>(inner: &Inner<K, V, F>, key: &Arc<K>, outcome: std::result::Result<Arc<V>, CacheError>)
where
    K: Eq + Hash,
{
    let senders = inner.waiters.lock().remove(key).unwrap_or_default();
    let shared: SharedOutcome<V> = outcome.map_err(Arc::new);
    for tx in senders {
        let _ = tx.send(shared.clone());
    }
}

#[derive(Debug)]
struct BoxedError(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for BoxedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}
impl std::error::Error for BoxedError {}
