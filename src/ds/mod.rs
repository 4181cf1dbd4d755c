pub mod event_counter;
pub mod keyed_lock;

pub use event_counter::{EventCounter, ThreadingPrecision};
pub use keyed_lock::{KeyedLockGuard, KeyedLocks};
