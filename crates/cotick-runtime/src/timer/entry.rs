//! Timer queue entry

use std::cmp::Ordering;
use std::time::Duration;

use cotick_core::event::Event;
use cotick_core::id::CoroutineId;

/// A pending wake-up: deliver `event` to `target` once `wake_at` passes
#[derive(Debug)]
pub struct TimerEntry {
    /// Absolute time on the scheduler's clock
    pub wake_at: Duration,

    /// Insertion order, breaks deadline ties
    pub seq: u64,

    /// Coroutine to resume
    pub target: CoroutineId,

    /// What to deliver; a `timer.sleep` event becomes an empty `resume`
    pub event: Event,
}

impl TimerEntry {
    #[inline]
    pub fn is_due(&self, now: Duration) -> bool {
        self.wake_at <= now
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.wake_at == other.wake_at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest wake first)
        match other.wake_at.cmp(&self.wake_at) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}
