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

//! Reference-strength policy: STRONG, SOFT, and WEAK retention modes for
//! stored keys and values, and the equality discipline each mode implies.
//!
//! Keys and values always travel through the public API as `Arc<K>`/`Arc<V>`
//! (see `DESIGN.md`): under STRONG strength that `Arc` is compared by the
//! wrapped type's own `Eq`, under SOFT/WEAK strength it is compared by
//! pointer identity, matching a reclaimed entry never being mistaken for a
//! fresh equal key.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

/// Retention mode for a stored key or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strength {
    /// Holds a direct, owning reference. Equality is the wrapped type's own
    /// `Eq`.
    #[default]
    Strong,
    /// Holds an owning reference that may be surrendered under simulated
    /// memory pressure (see [`crate::reclaim`]). Equality is identity.
    Soft,
    /// Holds a non-owning, reachability-tracked reference. Equality is
    /// identity.
    Weak,
}

impl Strength {
    /// Whether this strength compares by identity rather than by logical
    /// equality.
    pub fn is_identity(&self) -> bool {
        !matches!(self, Strength::Strong)
    }
}

/// A stored reference realizing one of the three strength modes.
pub enum StrengthRef<T> {
    Strong(Arc<T>),
    Soft(Arc<T>),
    Weak(Weak<T>),
}

impl<T> StrengthRef<T> {
    pub fn new(strength: Strength, value: Arc<T>) -> Self {
        match strength {
            Strength::Strong => StrengthRef::Strong(value),
            Strength::Soft => StrengthRef::Soft(value),
            Strength::Weak => StrengthRef::Weak(Arc::downgrade(&value)),
        }
    }

    /// Returns a strong handle to the referent, or `None` if a WEAK
    /// reference's target has already been reclaimed.
    pub fn upgrade(&self) -> Option<Arc<T>> {
        match self {
            StrengthRef::Strong(a) | StrengthRef::Soft(a) => Some(a.clone()),
            StrengthRef::Weak(w) => w.upgrade(),
        }
    }

    /// Whether the referent is still reachable. For STRONG/SOFT this is
    /// always true (they own the value); for WEAK it reflects whether any
    /// external owner still holds the `Arc`.
    pub fn is_alive(&self) -> bool {
        match self {
            StrengthRef::Strong(_) | StrengthRef::Soft(_) => true,
            StrengthRef::Weak(w) => w.strong_count() > 0,
        }
    }

    /// Identity comparison against another live `Arc` of the same type,
    /// used for SOFT/WEAK equivalence. Compares the allocation, not the
    /// contents.
    pub fn same_identity(&self, other: &Arc<T>) -> bool {
        match self {
            StrengthRef::Strong(a) | StrengthRef::Soft(a) => Arc::ptr_eq(a, other),
            StrengthRef::Weak(w) => w.upgrade().is_some_and(|a| Arc::ptr_eq(&a, other)),
        }
    }

    pub fn strength(&self) -> Strength {
        match self {
            StrengthRef::Strong(_) => Strength::Strong,
            StrengthRef::Soft(_) => Strength::Soft,
            StrengthRef::Weak(_) => Strength::Weak,
        }
    }
}

impl<T> Clone for StrengthRef<T> {
    fn clone(&self) -> Self {
        match self {
            StrengthRef::Strong(a) => StrengthRef::Strong(a.clone()),
            StrengthRef::Soft(a) => StrengthRef::Soft(a.clone()),
            StrengthRef::Weak(w) => StrengthRef::Weak(w.clone()),
        }
    }
}

/// Matches a candidate entry's stored reference against a lookup key,
/// honoring the equivalence the configured strength implies.
///
/// `Strong` deref's both sides and falls back to `Eq`; `Soft`/`Weak` require
/// the *same* `Arc` allocation the caller originally inserted.
pub fn matches<T: Eq>(strength: Strength, stored: &StrengthRef<T>, probe: &Arc<T>) -> bool {
    if strength.is_identity() {
        stored.same_identity(probe)
    } else {
        match stored.upgrade() {
            Some(live) => *live == **probe,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn strong_is_content_equal() {
        let a = Arc::new(42u64);
        let b = Arc::new(42u64);
        let stored = StrengthRef::new(Strength::Strong, a);
        assert!(matches(Strength::Strong, &stored, &b));
    }

    #[test_log::test]
    fn soft_is_identity_only() {
        let a = Arc::new(42u64);
        let b = Arc::new(42u64);
        let stored = StrengthRef::new(Strength::Soft, a.clone());
        assert!(matches(Strength::Soft, &stored, &a));
        assert!(!matches(Strength::Soft, &stored, &b));
    }

    #[test_log::test]
    fn weak_upgrade_fails_after_drop() {
        let a = Arc::new(42u64);
        let stored = StrengthRef::new(Strength::Weak, a.clone());
        assert!(stored.is_alive());
        drop(a);
        assert!(!stored.is_alive());
        assert!(stored.upgrade().is_none());
    }
}
