//! Rolling-window event counter.
//!
//! Approximates "how many times was this touched recently" without keeping
//! individual timestamps. The tracking window is divided into `granularity`
//! slots; every increment lands in the slot for the current time and the
//! counter value is the sum of the slots that still fall inside the window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                 EventCounter (granularity = 4, window = 4s)                 │
//! │                                                                             │
//! │   slot_duration = window / granularity = 1s                                 │
//! │   absolute slot  = (now - started) / slot_duration                          │
//! │   ring index     = absolute slot % granularity                              │
//! │                                                                             │
//! │   Each slot packs (epoch: u32 | count: u32) into one AtomicU64.             │
//! │                                                                             │
//! │   now = 9.5s  → absolute slot 9, live epochs are 6..=9                      │
//! │                                                                             │
//! │   Index:      0          1          2          3                            │
//! │            ┌──────────┬──────────┬──────────┬──────────┐                    │
//! │   slots:   │ e=8 c=2  │ e=9 c=1  │ e=2 c=7  │ e=7 c=3  │                    │
//! │            └──────────┴──────────┴──────────┴──────────┘                    │
//! │                 ▲          ▲          ✗          ▲                          │
//! │                live       live      stale       live                        │
//! │                                                                             │
//! │   value() = 2 + 1 + 3 = 6   (slot 2 fell out of the window)                 │
//! │                                                                             │
//! │   increment at 10.2s → absolute slot 10, index 2, epoch 2 != 10             │
//! │     → slot 2 is reset to (e=10, c=1) before counting                        │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The effective window is only respected to within one slot: events age out
//! somewhere between `window - slot_duration` and `window` after they happen.
//! Epochs are 32-bit: after 2^32 idle slots a stale slot can alias a live
//! one, which is why the dictionary rejects slots shorter than
//! [`MIN_SLOT_DURATION`](crate::policy::event_counting::MIN_SLOT_DURATION).
//!
//! ## Precision
//!
//! [`ThreadingPrecision::Fast`] performs a relaxed load followed by a store.
//! Two threads incrementing the same slot at the same instant may lose one of
//! the updates. [`ThreadingPrecision::Accurate`] uses a compare-and-swap loop
//! and never loses an increment.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//! use sourcecache::ds::{EventCounter, ThreadingPrecision};
//!
//! let counter = EventCounter::new(8, Duration::from_millis(125), Duration::ZERO);
//! for _ in 0..5 {
//!     counter.increment_at(Duration::from_millis(10), ThreadingPrecision::Accurate);
//! }
//! assert_eq!(counter.value_at(Duration::from_millis(20)), 5);
//!
//! // One full window later every slot is stale.
//! assert_eq!(counter.value_at(Duration::from_secs(2)), 0);
//! ```

use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::clock::saturating_nanos;

/// How increments on a shared counter are synchronized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ThreadingPrecision {
    /// Plain load/store; concurrent increments of the same slot may be lost.
    #[default]
    Fast,
    /// Compare-and-swap increments; no update is ever lost.
    Accurate,
}

const COUNT_MASK: u64 = 0xFFFF_FFFF;

#[inline]
fn pack(epoch: u32, count: u32) -> u64 {
    (u64::from(epoch) << 32) | u64::from(count)
}

#[inline]
fn epoch_of(word: u64) -> u32 {
    (word >> 32) as u32
}

#[inline]
fn count_of(word: u64) -> u32 {
    (word & COUNT_MASK) as u32
}

#[inline]
fn bump(word: u64, epoch: u32) -> u64 {
    if epoch_of(word) == epoch {
        pack(epoch, count_of(word).saturating_add(1))
    } else {
        pack(epoch, 1)
    }
}

/// Ring-buffer histogram of recent events.
///
/// Besides the slots, a counter carries the caller-attached `custom_size`
/// (byte cost of the tracked entry) and the sequence number of its most
/// recent touch, both used by the owning dictionary for eviction.
#[derive(Debug)]
pub struct EventCounter {
    id: u64,
    slots: Box<[AtomicU64]>,
    started: Duration,
    slot_nanos: u64,
    custom_size: AtomicUsize,
    last_touch: AtomicU64,
}

impl EventCounter {
    /// Creates a counter with `granularity` slots of `slot_duration` each,
    /// anchored at `started`.
    ///
    /// # Panics
    ///
    /// Panics if `granularity` is zero.
    pub fn new(granularity: usize, slot_duration: Duration, started: Duration) -> Self {
        Self::with_id(0, granularity, slot_duration, started)
    }

    pub(crate) fn with_id(
        id: u64,
        granularity: usize,
        slot_duration: Duration,
        started: Duration,
    ) -> Self {
        assert!(granularity > 0, "counter granularity must be > 0");
        let slots = (0..granularity).map(|_| AtomicU64::new(0)).collect();
        Self {
            id,
            slots,
            started,
            slot_nanos: saturating_nanos(slot_duration).max(1),
            custom_size: AtomicUsize::new(0),
            last_touch: AtomicU64::new(0),
        }
    }

    /// Identifier assigned by the owning dictionary.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of slots in the ring.
    #[inline]
    pub fn granularity(&self) -> usize {
        self.slots.len()
    }

    /// Duration covered by a single slot.
    #[inline]
    pub fn slot_duration(&self) -> Duration {
        Duration::from_nanos(self.slot_nanos)
    }

    #[inline]
    fn absolute_slot(&self, now: Duration) -> u64 {
        saturating_nanos(now.saturating_sub(self.started)) / self.slot_nanos
    }

    /// Records one event at time `now`.
    pub fn increment_at(&self, now: Duration, precision: ThreadingPrecision) {
        let absolute = self.absolute_slot(now);
        let slot = &self.slots[(absolute % self.slots.len() as u64) as usize];
        let epoch = absolute as u32;
        match precision {
            ThreadingPrecision::Fast => {
                let current = slot.load(Ordering::Relaxed);
                slot.store(bump(current, epoch), Ordering::Relaxed);
            },
            ThreadingPrecision::Accurate => {
                // fetch_update retries until the CAS lands.
                let _ = slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(bump(current, epoch))
                });
            },
        }
    }

    /// Sum of all slots still inside the window ending at `now`.
    ///
    /// O(granularity); keep granularity small.
    pub fn value_at(&self, now: Duration) -> u64 {
        let current = self.absolute_slot(now) as u32;
        let granularity = self.slots.len() as u32;
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .filter(|&word| current.wrapping_sub(epoch_of(word)) < granularity)
            .map(|word| u64::from(count_of(word)))
            .sum()
    }

    /// Byte cost attached by the caller.
    #[inline]
    pub fn custom_size(&self) -> usize {
        self.custom_size.load(Ordering::Acquire)
    }

    /// Replaces the attached byte cost, returning the previous one.
    #[inline]
    pub(crate) fn swap_custom_size(&self, size: usize) -> usize {
        self.custom_size.swap(size, Ordering::AcqRel)
    }

    /// Sequence number of the most recent touch.
    #[inline]
    pub fn last_touch(&self) -> u64 {
        self.last_touch.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn record_touch(&self, sequence: u64) {
        self.last_touch.fetch_max(sequence, Ordering::AcqRel);
    }

    /// Approximate heap + inline footprint of a counter with `granularity` slots.
    pub fn approx_bytes(granularity: usize) -> usize {
        mem::size_of::<Self>() + granularity * mem::size_of::<AtomicU64>()
    }
}
