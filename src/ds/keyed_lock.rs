//! Per-key mutual exclusion with bounded waits.
//!
//! Lets exactly one thread at a time do the expensive work for a given key
//! while threads working on other keys proceed untouched. Entries exist only
//! while some thread holds or waits on the key's lock.
//!
//! ```text
//!   in_flight: Mutex<FxHashMap<K, Arc<Mutex<()>>>>
//!
//!   try_lock_for(k)   lock map → clone or insert Arc → unlock map
//!                     wait on the per-key mutex (bounded)
//!   guard dropped /   lock map → release per-key mutex →
//!   wait timed out      remove entry if nobody else references it
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use sourcecache::ds::KeyedLocks;
//!
//! let locks = KeyedLocks::new();
//! let guard = locks.try_lock_for(&"a.jpg", Duration::from_millis(10)).unwrap();
//! assert!(locks.try_lock_for(&"a.jpg", Duration::from_millis(10)).is_none());
//! assert!(locks.try_lock_for(&"b.jpg", Duration::from_millis(10)).is_some());
//! drop(guard);
//! assert_eq!(locks.in_flight(), 0);
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use rustc_hash::FxHashMap;

type KeyMutex = Arc<Mutex<()>>;

/// Table of per-key locks.
pub struct KeyedLocks<K> {
    in_flight: Mutex<FxHashMap<K, KeyMutex>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<K> fmt::Debug for KeyedLocks<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLocks")
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits up to `timeout` for exclusive ownership of `key`.
    ///
    /// Returns `None` on timeout. The lock is released when the returned
    /// guard is dropped.
    pub fn try_lock_for(&self, key: &K, timeout: Duration) -> Option<KeyedLockGuard<'_, K>> {
        let mutex = {
            let mut map = self.in_flight.lock();
            Arc::clone(map.entry(key.clone()).or_default())
        };
        match mutex.try_lock_arc_for(timeout) {
            Some(guard) => Some(KeyedLockGuard {
                owner: self,
                key: key.clone(),
                guard: Some(guard),
            }),
            None => {
                self.release(key, mutex);
                None
            },
        }
    }

    /// Number of keys currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn release(&self, key: &K, mutex: KeyMutex) {
        let mut map = self.in_flight.lock();
        drop(mutex);
        if map.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            map.remove(key);
        }
    }
}

/// Exclusive ownership of one key in a [`KeyedLocks`] table.
pub struct KeyedLockGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    owner: &'a KeyedLocks<K>,
    key: K,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl<K> KeyedLockGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> fmt::Debug for KeyedLockGuard<'_, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedLockGuard").field("key", &self.key).finish()
    }
}

impl<K> Drop for KeyedLockGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let mutex = ArcMutexGuard::mutex(&guard).clone();
            drop(guard);
            self.owner.release(&self.key, mutex);
        }
    }
}
