//! # Seams between the usage tracker, the value store, and callers
//!
//! ```text
//!        caller key (&C::Key)
//!               │
//!               ▼
//!   ┌──────────────────────────┐
//!   │     KeyComparer (C)      │  canonicalize(&Key) → Canonical
//!   └────────────┬─────────────┘
//!                │ C::Canonical (Eq + Hash)
//!       ┌────────┴──────────────────────────┐
//!       ▼                                   ▼
//!   ConstrainedCache.data            EventCountingDictionary
//!   (Canonical → Arc<V>)             (Canonical ↔ EventCounter)
//!       ▲                                   │
//!       │   CounterRemovedListener          │
//!       └───────── counter_removed ─────────┘
//!                 (fired outside tracker locks)
//! ```
//!
//! ## Key comparison
//!
//! Maps never rely on the caller's own `Eq`/`Hash`. A [`KeyComparer`] is
//! injected at construction and reduces each key to a canonical form that
//! the internal maps hash. Two keys are the same entry exactly when their
//! canonical forms are equal.
//!
//! | Comparer            | `Key`   | `Canonical` | Equality                  |
//! |---------------------|---------|-------------|---------------------------|
//! | [`Ordinal<K>`]      | `K`     | `K`         | `K: Eq`                   |
//! | [`CaseInsensitive`] | `str`   | `String`    | Unicode lowercase folding |
//!
//! ## Removal notification
//!
//! [`CounterRemovedListener`] is how the usage tracker tells a co-located
//! store that a key lost its counter. Closures of the right shape implement
//! it directly.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Equality/hashing strategy for cache keys.
pub trait KeyComparer: Send + Sync + 'static {
    /// Key type accepted from callers.
    type Key: ?Sized;
    /// Form stored in the internal maps.
    type Canonical: Clone + Eq + Hash + Send + Sync + 'static;

    /// Reduces `key` to the canonical form used for hashing and equality.
    fn canonicalize(&self, key: &Self::Key) -> Self::Canonical;
}

/// Compares keys with their own `Eq`/`Hash`.
pub struct Ordinal<K>(PhantomData<fn() -> K>);

impl<K> Ordinal<K> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K> Default for Ordinal<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for Ordinal<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for Ordinal<K> {}

impl<K> fmt::Debug for Ordinal<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ordinal")
    }
}

impl<K> KeyComparer for Ordinal<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    type Key = K;
    type Canonical = K;

    #[inline]
    fn canonicalize(&self, key: &K) -> K {
        key.clone()
    }
}

/// Case-insensitive string keys.
///
/// ```
/// use sourcecache::traits::{CaseInsensitive, KeyComparer};
///
/// let cmp = CaseInsensitive;
/// assert_eq!(cmp.canonicalize("/Images/A.JPG"), cmp.canonicalize("/images/a.jpg"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitive;

impl KeyComparer for CaseInsensitive {
    type Key = str;
    type Canonical = String;

    #[inline]
    fn canonicalize(&self, key: &str) -> String {
        key.to_lowercase()
    }
}

/// Receives one call per counter removed by the usage tracker.
///
/// Called without any tracker lock held, possibly from a background thread.
pub trait CounterRemovedListener<K>: Send + Sync {
    /// `value` is the counter's reading at the moment it was removed.
    fn counter_removed(&self, key: &K, value: u64);
}

impl<K, F> CounterRemovedListener<K> for F
where
    F: Fn(&K, u64) + Send + Sync,
{
    fn counter_removed(&self, key: &K, value: u64) {
        self(key, value)
    }
}
