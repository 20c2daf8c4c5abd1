//! Coroutine identifier type

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a coroutine
///
/// Drawn from a process-wide monotonic counter, so an identity is never
/// handed out twice, even after the coroutine it named has been destroyed
/// and stale queue entries still mention it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CoroutineId(u64);

impl CoroutineId {
    /// Allocate the next identity
    #[inline]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        CoroutineId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value (tests, logging round-trips)
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        CoroutineId(raw)
    }

    /// Get the raw value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoroutineId({})", self.0)
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "co#{}", self.0)
    }
}
