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

//! The resolved, serializable half of a built cache's configuration
//! (spec.md §3's `CacheConfig` entity).
//!
//! A [`RemovalListener`](crate::RemovalListener) and a
//! [`Ticker`](crate::Ticker) are both trait objects supplied at build time
//! and have no serializable representation, so they're deliberately absent
//! here — spec.md §6 only promises that serialization "must round-trip the
//! *configuration*", and per spec.md §1 table serialization itself is an
//! external collaborator's concern. This type is the part of that contract
//! that belongs to the core: every numeric knob and every reference-strength
//! choice a [`CacheBuilder`](crate::CacheBuilder) accepted.

use serde::{Deserialize, Serialize};

use crate::strength::Strength;

/// The resolved configuration of a built [`Cache`](crate::Cache), separate
/// from the builder's one-shot knob-setting state machine. Round-trips
/// through `serde` so a caller persisting a cache's configuration (spec.md
/// §6) can rebuild an equivalent [`CacheBuilder`](crate::CacheBuilder)
/// without needing to remember every knob it originally called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub initial_capacity: usize,
    pub concurrency_level: usize,
    pub maximum_size: Option<u64>,
    pub key_strength: Strength,
    pub value_strength: Strength,
    /// Nanoseconds; `None` disables write-TTL expiration.
    pub expire_after_write_nanos: Option<u64>,
    /// Nanoseconds; `None` disables access-TTL expiration.
    pub expire_after_access_nanos: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            concurrency_level: 4,
            maximum_size: None,
            key_strength: Strength::Strong,
            value_strength: Strength::Strong,
            expire_after_write_nanos: None,
            expire_after_access_nanos: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn round_trips_through_json() {
        let cfg = CacheConfig {
            initial_capacity: 32,
            concurrency_level: 8,
            maximum_size: Some(1_000),
            key_strength: Strength::Weak,
            value_strength: Strength::Soft,
            expire_after_write_nanos: Some(60_000_000_000),
            expire_after_access_nanos: None,
        };
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: CacheConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(cfg, back);
    }

    #[test_log::test]
    fn default_matches_builder_defaults() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.initial_capacity, 16);
        assert_eq!(cfg.concurrency_level, 4);
        assert_eq!(cfg.maximum_size, None);
    }
}
