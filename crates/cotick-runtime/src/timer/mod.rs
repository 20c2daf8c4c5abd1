//! Timer service
//!
//! Deadline queue for voluntary sleeps and delayed event delivery. Every
//! heartbeat pops all due entries, soonest first, and resumes their target
//! coroutines through the registry.

mod entry;

pub use entry::TimerEntry;

use std::cell::{Cell, RefCell};
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

use cotick_core::error::CoResult;
use cotick_core::event::{Event, EventName, Payload, Source};
use cotick_core::id::CoroutineId;
use cotick_core::traits::{Clock, DiagnosticSink};

use crate::registry::CoroutineRegistry;

pub struct TimerService {
    clock: Rc<dyn Clock>,
    sink: Rc<dyn DiagnosticSink>,
    queue: RefCell<BinaryHeap<TimerEntry>>,
    seq: Cell<u64>,
}

impl TimerService {
    pub fn new(clock: Rc<dyn Clock>, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            clock,
            sink,
            queue: RefCell::new(BinaryHeap::new()),
            seq: Cell::new(0),
        }
    }

    /// Suspend the current coroutine for `duration`
    ///
    /// Returns the payload of the `resume` that wakes it. Outside any
    /// coroutine this blocks the thread instead and returns an empty payload.
    pub fn sleep(&self, registry: &CoroutineRegistry, duration: Duration) -> CoResult<Payload> {
        let Some(co) = registry.current() else {
            std::thread::sleep(duration);
            return Ok(Payload::Empty);
        };

        let event = Event::new(
            EventName::Sleep,
            Payload::value(duration),
            Source::Coroutine(co.id()),
        );
        self.push(duration, co.id(), event);
        co.suspend()
    }

    /// Deliver `event` to `target` after `delay`
    pub fn post(&self, delay: Duration, target: CoroutineId, event: Event) {
        self.push(delay, target, event);
    }

    fn push(&self, delay: Duration, target: CoroutineId, event: Event) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.queue.borrow_mut().push(TimerEntry {
            wake_at: self.clock.now() + delay,
            seq,
            target,
            event,
        });
    }

    /// Fire every due entry, soonest first
    ///
    /// Resume failures go to the diagnostic sink. Entries whose coroutine
    /// is gone are dropped silently.
    pub fn heartbeat(&self, registry: &CoroutineRegistry) {
        let now = self.clock.now();
        loop {
            let due = {
                let mut queue = self.queue.borrow_mut();
                match queue.peek() {
                    Some(entry) if entry.is_due(now) => queue.pop(),
                    _ => None,
                }
            };
            let Some(entry) = due else {
                break;
            };

            let event = if entry.event.is(&EventName::Sleep) {
                Event::resume(Payload::Empty, Source::Timer)
            } else {
                entry.event
            };
            if let Err(error) = registry.resume_by_id(entry.target, Some(event), None) {
                self.sink.report(&error);
            }
        }
    }

    /// Drop every pending entry without firing
    pub fn reset_on_fork(&self) {
        let drained = std::mem::take(&mut *self.queue.borrow_mut());
        drop(drained);
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Earliest pending wake time
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.borrow().peek().map(|e| e.wake_at)
    }
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerService")
            .field("pending", &self.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}
