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

//! The fluent builder: one-shot configuration knobs, each checked at call
//! time rather than at `build()`, and the three-way build-target
//! selection (default table / evict-on-insert "null cache" / custom
//! table).

use std::{hash::{BuildHasher, Hash}, sync::Arc, time::Duration};

use ahash::RandomState;

use crate::{
    cache::{Cache, Table},
    computing::ComputingCache,
    config::CacheConfig,
    error::{CacheError, Result},
    listener::{DefaultRemovalListener, RemovalCause, RemovalListener},
    segment::SegmentConfig,
    strength::Strength,
    ticker::{SystemTicker, Ticker},
};

/// The legacy single-TTL alias, mutually exclusive with both modern TTL
/// knobs and with itself (spec.md's Open Question, resolved in
/// `DESIGN.md`).
#[derive(Debug, Clone, Copy)]
pub enum Expiration {
    AfterWrite(Duration),
    AfterAccess(Duration),
}

/// Builds a [`Cache`]. Every knob may be set at most once; a second call
/// to the same knob returns [`CacheError::InvalidState`] rather than
/// silently overwriting the first value.
pub struct CacheBuilder<K, V, S = RandomState> {
    initial_capacity: Option<usize>,
    concurrency_level: Option<usize>,
    maximum_size: Option<u64>,
    key_strength: Option<Strength>,
    value_strength: Option<Strength>,
    expire_after_write: Option<Duration>,
    expire_after_access: Option<Duration>,
    legacy_expiration: Option<Expiration>,
    removal_listener: Option<Arc<dyn RemovalListener<K, V>>>,
    ticker: Option<Arc<dyn Ticker>>,
    _marker: std::marker::PhantomData<S>,
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    /// `capacity` seeds `maximumSize`; pass `u64::MAX` for an effectively
    /// unbounded cache and call `.maximum_size` explicitly if a different
    /// bound is wanted later (builder knobs still permit exactly one
    /// assignment, so don't call both).
    pub fn new() -> Self {
        Self {
            initial_capacity: None,
            concurrency_level: None,
            maximum_size: None,
            key_strength: None,
            value_strength: None,
            expire_after_write: None,
            expire_after_access: None,
            legacy_expiration: None,
            removal_listener: None,
            ticker: None,
            _marker: std::marker::PhantomData,
        }
    }

    fn set_once<T>(slot: &mut Option<T>, value: T, name: &str) -> Result<()> {
        if slot.is_some() {
            return Err(CacheError::invalid_state(format!("{name} already set")));
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn initial_capacity(mut self, capacity: usize) -> Result<Self> {
        Self::set_once(&mut self.initial_capacity, capacity, "initialCapacity")?;
        Ok(self)
    }

    pub fn concurrency_level(mut self, level: usize) -> Result<Self> {
        if level == 0 {
            return Err(CacheError::invalid_argument("concurrencyLevel must be positive"));
        }
        Self::set_once(&mut self.concurrency_level, level, "concurrencyLevel")?;
        Ok(self)
    }

    pub fn maximum_size(mut self, size: u64) -> Result<Self> {
        Self::set_once(&mut self.maximum_size, size, "maximumSize")?;
        Ok(self)
    }

    pub fn weak_keys(mut self) -> Result<Self> {
        Self::set_once(&mut self.key_strength, Strength::Weak, "key strength")?;
        Ok(self)
    }

    pub fn soft_keys(mut self) -> Result<Self> {
        Self::set_once(&mut self.key_strength, Strength::Soft, "key strength")?;
        Ok(self)
    }

    pub fn weak_values(mut self) -> Result<Self> {
        Self::set_once(&mut self.value_strength, Strength::Weak, "value strength")?;
        Ok(self)
    }

    pub fn soft_values(mut self) -> Result<Self> {
        Self::set_once(&mut self.value_strength, Strength::Soft, "value strength")?;
        Ok(self)
    }

    pub fn expire_after_write(mut self, duration: Duration) -> Result<Self> {
        Self::set_once(&mut self.expire_after_write, duration, "expireAfterWrite")?;
        Ok(self)
    }

    pub fn expire_after_access(mut self, duration: Duration) -> Result<Self> {
        Self::set_once(&mut self.expire_after_access, duration, "expireAfterAccess")?;
        Ok(self)
    }

    /// Legacy alias for a single TTL. Mutually exclusive with both modern
    /// TTL knobs and with itself.
    pub fn expiration(mut self, expiration: Expiration) -> Result<Self> {
        if self.expire_after_write.is_some() || self.expire_after_access.is_some() {
            return Err(CacheError::invalid_state("expiration() is mutually exclusive with expire_after_write/expire_after_access"));
        }
        Self::set_once(&mut self.legacy_expiration, expiration, "expiration")?;
        Ok(self)
    }

    pub fn removal_listener<L>(mut self, listener: L) -> Result<Self>
    where
        L: RemovalListener<K, V> + 'static,
    {
        Self::set_once(&mut self.removal_listener, Arc::new(listener) as Arc<dyn RemovalListener<K, V>>, "removalListener")?;
        Ok(self)
    }

    pub fn ticker<T>(mut self, ticker: T) -> Result<Self>
    where
        T: Ticker + 'static,
    {
        Self::set_once(&mut self.ticker, Arc::new(ticker) as Arc<dyn Ticker>, "ticker")?;
        Ok(self)
    }

    fn resolved_ttls(&self) -> Result<(Option<Duration>, Option<Duration>)> {
        if self.legacy_expiration.is_none() {
            return Ok((self.expire_after_write, self.expire_after_access));
        }
        if self.expire_after_write.is_some() || self.expire_after_access.is_some() {
            return Err(CacheError::invalid_state("expiration() is mutually exclusive with expire_after_write/expire_after_access"));
        }
        match self.legacy_expiration.unwrap() {
            Expiration::AfterWrite(d) => Ok((Some(d), None)),
            Expiration::AfterAccess(d) => Ok((None, Some(d))),
        }
    }

    pub fn build(self) -> Result<Cache<K, V, S>> {
        let concurrency_level = self.concurrency_level.unwrap_or(4);
        let initial_capacity = self.initial_capacity.unwrap_or(16);
        let (write_ttl, access_ttl) = self.resolved_ttls()?;
        let listener: Arc<dyn RemovalListener<K, V>> = self.removal_listener.clone().unwrap_or_else(|| Arc::new(DefaultRemovalListener));
        let ticker: Arc<dyn Ticker> = self.ticker.clone().unwrap_or_else(|| Arc::new(SystemTicker::default()));
        let key_strength = self.key_strength.unwrap_or_default();
        let value_strength = self.value_strength.unwrap_or_default();

        let config = CacheConfig {
            initial_capacity,
            concurrency_level,
            maximum_size: self.maximum_size,
            key_strength,
            value_strength,
            expire_after_write_nanos: write_ttl.map(|d| d.as_nanos() as u64),
            expire_after_access_nanos: access_ttl.map(|d| d.as_nanos() as u64),
        };

        let size_is_null = self.maximum_size == Some(0);
        let write_ttl_is_null = write_ttl == Some(Duration::ZERO);
        let access_ttl_is_null = access_ttl == Some(Duration::ZERO);

        if size_is_null {
            return Ok(Cache::null(listener, RemovalCause::Size, config));
        }
        if write_ttl_is_null || access_ttl_is_null {
            return Ok(Cache::null(listener, RemovalCause::Expired, config));
        }

        let shard_count = concurrency_level.next_power_of_two();
        let per_segment_max = self.maximum_size.map(|m| ((m + shard_count as u64 - 1) / shard_count as u64) as usize);
        let per_segment_capacity_hint = (initial_capacity / shard_count).max(1);
        let soft_capacity = per_segment_max.unwrap_or(per_segment_capacity_hint.max(64));

        let table = Table::new(
            shard_count,
            S::default(),
            move || SegmentConfig {
                key_strength,
                value_strength,
                max_size: per_segment_max,
                write_ttl_nanos: write_ttl.map(|d| d.as_nanos() as u64),
                access_ttl_nanos: access_ttl.map(|d| d.as_nanos() as u64),
                soft_capacity,
                object_pool_capacity: 128,
            },
            listener,
            ticker,
            config,
        );
        Ok(Cache::from_table(table))
    }

    /// Seeds a fresh builder from a previously-persisted [`CacheConfig`]
    /// (spec.md §6: "serialization must round-trip the configuration"),
    /// pre-filling every numeric/strength knob it carries. A
    /// [`RemovalListener`] and a [`Ticker`] have no serializable form and
    /// are never part of `CacheConfig`, so they still need to be supplied
    /// separately (or left at their defaults) before calling `.build()`.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let mut builder = Self::new().initial_capacity(config.initial_capacity)?.concurrency_level(config.concurrency_level)?;
        if let Some(max) = config.maximum_size {
            builder = builder.maximum_size(max)?;
        }
        builder = match config.key_strength {
            Strength::Strong => builder,
            Strength::Soft => builder.soft_keys()?,
            Strength::Weak => builder.weak_keys()?,
        };
        builder = match config.value_strength {
            Strength::Strong => builder,
            Strength::Soft => builder.soft_values()?,
            Strength::Weak => builder.weak_values()?,
        };
        if let Some(nanos) = config.expire_after_write_nanos {
            builder = builder.expire_after_write(Duration::from_nanos(nanos))?;
        }
        if let Some(nanos) = config.expire_after_access_nanos {
            builder = builder.expire_after_access(Duration::from_nanos(nanos))?;
        }
        Ok(builder)
    }
}

impl<K, V> CacheBuilder<K, V, RandomState>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Send + Sync + 'static,
{
    /// Builds a computing cache: `get` computes on miss via `f` instead of
    /// ever returning absent. Only available with the default hasher —
    /// nothing about the computing protocol depends on it, it's simply
    /// not a knob this builder exposes per key/value type combination.
    pub fn build_computing<F, Fut>(self, f: F) -> Result<ComputingCache<K, V, F>>
    where
        F: Fn(Arc<K>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<Arc<V>, Box<dyn std::error::Error + Send + Sync>>> + Send + 'static,
    {
        let cache = self.build()?;
        Ok(ComputingCache::new(cache, f))
    }
}

impl<K, V, S> Default for CacheBuilder<K, V, S>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Eq + Send + Sync + 'static,
    S: BuildHasher + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn defaults_build_a_stock_table_with_no_eviction_or_expiration() {
        let cache = CacheBuilder::<u64, u64>::new().build().unwrap();
        for i in 0..1_000 {
            cache.insert(Arc::new(i), Arc::new(i));
        }
        assert_eq!(cache.len(), 1_000);
    }

    #[test_log::test]
    fn initial_capacity_can_be_set_exactly_once() {
        let builder = CacheBuilder::<u64, u64>::new().initial_capacity(64).unwrap();
        assert!(builder.initial_capacity(128).is_err());
    }

    #[test_log::test]
    fn key_and_value_strength_are_independent_knobs() {
        let cache = CacheBuilder::<String, String>::new().soft_keys().unwrap().weak_values().unwrap().build().unwrap();
        cache.insert(Arc::new("a".to_string()), Arc::new("1".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test_log::test]
    fn setting_key_strength_twice_is_rejected_even_via_different_knobs() {
        let err = CacheBuilder::<u64, u64>::new().weak_keys().unwrap().soft_keys();
        assert!(err.is_err());
    }

    #[test_log::test]
    fn zero_write_ttl_builds_a_null_cache() {
        let cache = CacheBuilder::<u64, u64>::new().expire_after_write(Duration::ZERO).unwrap().build().unwrap();
        cache.insert(Arc::new(1), Arc::new(1));
        assert_eq!(cache.len(), 0);
    }

    #[test_log::test]
    fn legacy_expiration_alias_maps_to_the_matching_modern_ttl() {
        let cache = CacheBuilder::<u64, u64>::new().expiration(Expiration::AfterWrite(Duration::from_secs(3600))).unwrap().build().unwrap();
        cache.insert(Arc::new(1), Arc::new(1));
        assert_eq!(cache.get(&Arc::new(1)), Some(Arc::new(1)));
    }

    #[test_log::test]
    fn config_round_trips_through_json_and_rebuilds_an_equivalent_builder() -> anyhow::Result<()> {
        let original = CacheBuilder::<u64, u64>::new()
            .maximum_size(64)?
            .concurrency_level(2)?
            .weak_keys()?
            .expire_after_write(Duration::from_secs(30))?
            .build()?;
        let config = original.config();

        let json = serde_json::to_string(&config)?;
        let restored: CacheConfig = serde_json::from_str(&json)?;
        assert_eq!(config, restored);

        let rebuilt = CacheBuilder::<u64, u64>::from_config(&restored)?.build()?;
        assert_eq!(rebuilt.config(), config);
        Ok(())
    }

    #[test_log::test]
    fn removal_listener_can_only_be_installed_once() {
        use crate::listener::{DefaultRemovalListener, RemovalCause};
        struct Noop;
        impl RemovalListener<u64, u64> for Noop {
            fn on_removal(&self, _key: Option<&Arc<u64>>, _value: Option<&Arc<u64>>, _cause: RemovalCause) {}
        }
        let builder = CacheBuilder::<u64, u64>::new().removal_listener(Noop).unwrap();
        assert!(builder.removal_listener(DefaultRemovalListener).is_err());
    }
}
