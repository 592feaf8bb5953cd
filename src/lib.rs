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

//! A configurable, segmented, in-memory concurrent associative cache.
//!
//! The table is split into independently locked segments; each segment
//! keeps its live entries in both a recency-ordered list (for
//! size-based LRU eviction) and a write-ordered list (for TTL
//! expiration), and offers STRONG, SOFT, or WEAK retention for keys and
//! values independently. A [`CacheBuilder`] assembles one of three
//! variants: a stock table with no eviction or expiration, an
//! evict-on-insert "null cache" (when max size or any TTL is configured
//! to zero), or a fully custom table.
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use concur_cache::CacheBuilder;
//!
//! let cache = CacheBuilder::<u64, String>::new()
//!     .maximum_size(10_000)?
//!     .expire_after_write(Duration::from_secs(60))?
//!     .build()?;
//!
//! cache.insert(Arc::new(1), Arc::new("one".to_string()));
//! assert_eq!(cache.get(&Arc::new(1)).as_deref().map(String::as_str), Some("one"));
//! # Ok::<(), concur_cache::CacheError>(())
//! ```

mod builder;
mod cache;
mod computing;
mod config;
mod error;
mod handle;
mod indexer;
mod list;
mod listener;
mod metrics;
mod reclaim;
mod segment;
mod strength;
mod ticker;

pub use ahash::RandomState;

pub use crate::{
    builder::{CacheBuilder, Expiration},
    cache::{Cache, Iter},
    computing::ComputingCache,
    config::CacheConfig,
    error::{CacheError, NullComputation, Result},
    listener::{DefaultRemovalListener, RemovalCause, RemovalListener},
    metrics::Metrics,
    strength::Strength,
    ticker::{FakeTicker, SystemTicker, Ticker},
};
