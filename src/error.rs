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

use std::fmt;

/// Errors surfaced by the builder and by the cache's runtime operations.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// A negative, zero-where-disallowed, or otherwise malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A builder knob was set more than once, or mutually exclusive knobs
    /// were combined (e.g. the legacy TTL alias together with a modern TTL
    /// knob).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Reserved for an auxiliary sizing feature (e.g. a Bloom-filter-style
    /// pre-sizing layer) that sits on top of this cache but is not part of
    /// the cache core. No code path in this crate constructs this variant.
    #[error("capacity impossible: {0}")]
    CapacityImpossible(String),

    /// The compute function of a computing cache failed, or returned an
    /// absent value where one was required.
    #[error("computation failed: {0}")]
    Computation(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A waiter on a pending computation was cancelled before the
    /// computation published a result.
    #[error("computation wait was cancelled")]
    Cancelled,
}

impl CacheError {
    /// Wraps a compute function failure.
    pub fn computation<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Computation(Box::new(cause))
    }

    /// Rebuilds a computation failure for a waiter sharing another
    /// caller's already-wrapped outcome, avoiding a double wrap: if `cause`
    /// is itself a [`CacheError::Computation`], only its inner message is
    /// carried forward rather than nesting a second "computation failed"
    /// layer around it.
    pub(crate) fn shared_computation(cause: &CacheError) -> Self {
        match cause {
            CacheError::Computation(inner) => Self::Computation(Box::new(SharedMessage(inner.to_string()))),
            other => Self::Computation(Box::new(SharedMessage(other.to_string()))),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Carries the flattened message of a computation failure shared across
/// waiters, without re-deriving from the original (non-`Clone`) error.
#[derive(Debug)]
struct SharedMessage(String);

impl fmt::Display for SharedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SharedMessage {}

/// The failure produced when a compute function yields an absent value
/// rather than erroring outright.
#[derive(Debug)]
pub struct NullComputation;

impl fmt::Display for NullComputation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compute function returned no value")
    }
}

impl std::error::Error for NullComputation {}

impl From<tokio::sync::oneshot::error::RecvError> for CacheError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        CacheError::Cancelled
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
