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

//! Pluggable time source for TTL bookkeeping.
//!
//! The segment only ever asks for "now" in nanoseconds since some fixed,
//! monotonic origin. In production that's [`SystemTicker`]; tests that need
//! to deterministically cross a TTL boundary swap in a [`FakeTicker`].

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

/// A monotonic nanosecond clock.
pub trait Ticker: Send + Sync + 'static {
    /// Current time, in nanoseconds since an arbitrary but fixed origin.
    fn read(&self) -> u64;
}

/// The default ticker, backed by [`std::time::Instant`].
#[derive(Clone)]
pub struct SystemTicker {
    origin: Instant,
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Ticker for SystemTicker {
    fn read(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// A manually-advanced ticker for deterministic expiration tests.
#[derive(Clone, Default)]
pub struct FakeTicker {
    nanos: Arc<AtomicU64>,
}

impl FakeTicker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `nanos` nanoseconds.
    pub fn advance(&self, nanos: u64) {
        self.nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Ticker for FakeTicker {
    fn read(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn fake_ticker_starts_at_zero_and_advances() {
        let ticker = FakeTicker::new();
        assert_eq!(ticker.read(), 0);
        ticker.advance(100);
        assert_eq!(ticker.read(), 100);
        ticker.advance(50);
        assert_eq!(ticker.read(), 150);
    }

    #[test_log::test]
    fn fake_ticker_set_overrides_the_current_value() {
        let ticker = FakeTicker::new();
        ticker.advance(10);
        ticker.set(5);
        assert_eq!(ticker.read(), 5);
    }

    #[test_log::test]
    fn system_ticker_is_monotonic() {
        let ticker = SystemTicker::default();
        let a = ticker.read();
        let b = ticker.read();
        assert!(b >= a);
    }
}
