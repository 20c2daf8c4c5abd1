//! Coroutine registry
//!
//! Table of live coroutines keyed by identity, plus the two scheduling
//! queues driven by the host tick:
//!
//! - **dispatch queue**: spawned but not yet started, drained FIFO
//! - **timeout queue**: `(deadline, id)` entries, soonest first, validated
//!   lazily by the sweep
//!
//! Every drain pops one entry at a time and releases its borrow before
//! running coroutine code, so handlers may spawn, resume or destroy
//! coroutines while a pass is in progress.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use cotick_core::error::{CoError, CoResult};
use cotick_core::event::Event;
use cotick_core::id::CoroutineId;
use cotick_core::traits::{Clock, DiagnosticSink};

use crate::coroutine::Coroutine;
use crate::tls;

/// Dispatch queue entry; higher priority pops first
struct DispatchEntry {
    priority: i64,
    co: Coroutine,
}

impl PartialEq for DispatchEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for DispatchEntry {}

impl PartialOrd for DispatchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DispatchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority.cmp(&other.priority)
    }
}

/// Timeout queue entry (min-heap by deadline)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimeoutEntry {
    deadline: Duration,
    seq: u64,
    id: CoroutineId,
}

impl PartialOrd for TimeoutEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeoutEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        // Tie-break by insertion sequence for deterministic ordering
        match other.deadline.cmp(&self.deadline) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

pub struct CoroutineRegistry {
    clock: Rc<dyn Clock>,
    sink: Rc<dyn DiagnosticSink>,
    table: RefCell<HashMap<CoroutineId, Coroutine>>,
    dispatch: RefCell<BinaryHeap<DispatchEntry>>,
    next_priority: Cell<i64>,
    timeouts: RefCell<BinaryHeap<TimeoutEntry>>,
    timeout_seq: Cell<u64>,
    /// Destroyed while suspended; unwound at the next sweep
    retired: RefCell<VecDeque<Coroutine>>,
}

impl CoroutineRegistry {
    pub fn new(clock: Rc<dyn Clock>, sink: Rc<dyn DiagnosticSink>) -> Self {
        Self {
            clock,
            sink,
            table: RefCell::new(HashMap::new()),
            dispatch: RefCell::new(BinaryHeap::new()),
            next_priority: Cell::new(0),
            timeouts: RefCell::new(BinaryHeap::new()),
            timeout_seq: Cell::new(0),
            retired: RefCell::new(VecDeque::new()),
        }
    }

    // ------------------------------------------------------------------
    // Table
    // ------------------------------------------------------------------

    #[inline]
    pub fn lookup(&self, id: CoroutineId) -> Option<Coroutine> {
        self.table.borrow().get(&id).cloned()
    }

    #[inline]
    pub fn contains(&self, id: CoroutineId) -> bool {
        self.table.borrow().contains_key(&id)
    }

    /// The registered coroutine executing on the caller's stack
    pub fn current(&self) -> Option<Coroutine> {
        tls::current_id().and_then(|id| self.lookup(id))
    }

    pub fn register(&self, co: &Coroutine) {
        self.table.borrow_mut().insert(co.id(), co.clone());
    }

    /// Remove `co`; returns whether it was registered
    pub fn unregister(&self, co: &Coroutine) -> bool {
        let removed = self.table.borrow_mut().remove(&co.id());
        removed.is_some()
    }

    /// Live coroutine count
    pub fn len(&self) -> usize {
        self.table.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.borrow().is_empty()
    }

    // ------------------------------------------------------------------
    // Addressing by identity
    // ------------------------------------------------------------------

    /// Resume the coroutine registered as `id`, lowering `flag` first
    ///
    /// A vanished coroutine is not an error: `Ok(None)`.
    pub fn resume_by_id(
        &self,
        id: CoroutineId,
        event: Option<Event>,
        flag: Option<&str>,
    ) -> CoResult<Option<Event>> {
        let Some(co) = self.lookup(id) else {
            return Ok(None);
        };
        if let Some(flag) = flag {
            co.unflag(flag);
        }
        co.resume(event)
    }

    /// Inject `error` into the coroutine registered as `id`, if any
    pub fn throw_by_id(&self, id: CoroutineId, error: CoError) {
        if let Some(co) = self.lookup(id) {
            co.throw(error);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch queue
    // ------------------------------------------------------------------

    /// Enqueue `co`; earlier insertions dequeue first
    pub fn schedule(&self, co: &Coroutine) {
        let priority = self.next_priority.get();
        self.next_priority.set(priority - 1);
        self.dispatch.borrow_mut().push(DispatchEntry {
            priority,
            co: co.clone(),
        });
    }

    /// Execute every queued coroutine, including ones queued meanwhile
    ///
    /// Errors escaping `execute()` go to the diagnostic sink.
    pub fn run_dispatch_queue(&self) {
        loop {
            let next = self.dispatch.borrow_mut().pop();
            let Some(entry) = next else {
                break;
            };
            if let Err(error) = entry.co.execute() {
                self.sink.report(&error);
            }
        }
    }

    pub fn dispatch_len(&self) -> usize {
        self.dispatch.borrow().len()
    }

    // ------------------------------------------------------------------
    // Timeouts and sweep
    // ------------------------------------------------------------------

    /// Watch `id` for a deadline `after` from now
    pub fn arm_timeout(&self, id: CoroutineId, after: Duration) {
        let seq = self.timeout_seq.get();
        self.timeout_seq.set(seq + 1);
        self.timeouts.borrow_mut().push(TimeoutEntry {
            deadline: self.clock.now() + after,
            seq,
            id,
        });
    }

    pub fn timeout_len(&self) -> usize {
        self.timeouts.borrow().len()
    }

    /// Soonest armed deadline
    pub fn next_timeout(&self) -> Option<Duration> {
        self.timeouts.borrow().peek().map(|e| e.deadline)
    }

    /// Garbage collection pass
    ///
    /// 1. Log coroutines that are finished or flag-less but still registered.
    /// 2. Drain due timeout entries: drop vanished and superseded ones,
    ///    destroy finished ones, inject `TimeoutExceeded` into the rest.
    ///    Stops at the first entry not yet due.
    /// 3. Unwind retired stacks.
    pub fn sweep(&self) {
        let live: Vec<Coroutine> = self.table.borrow().values().cloned().collect();
        for co in &live {
            if co.terminated() {
                self.sink
                    .info(&format!("warning: discovered a coroutine that has ended: {}", co.id()));
            } else if !co.has_pending_flags() {
                self.sink
                    .info(&format!("warning: found a coroutine with no pending flags: {}", co.id()));
            }
        }
        drop(live);

        let now = self.clock.now();
        loop {
            let top = self.timeouts.borrow().peek().copied();
            let Some(entry) = top else {
                break;
            };

            let Some(co) = self.lookup(entry.id) else {
                self.timeouts.borrow_mut().pop();
                continue;
            };

            // Re-armed to a later deadline: that arm pushed its own entry
            let deadline = co.timeout_deadline().unwrap_or(entry.deadline);
            if entry.deadline < deadline && co.has_pending_flags() {
                self.timeouts.borrow_mut().pop();
                continue;
            }
            if deadline > now && co.has_pending_flags() {
                break;
            }

            self.timeouts.borrow_mut().pop();
            if co.terminated() {
                co.destroy();
            } else {
                co.throw(CoError::TimeoutExceeded);
            }
        }

        self.reap_retired();
    }

    pub(crate) fn retire(&self, co: Coroutine) {
        self.retired.borrow_mut().push_back(co);
    }

    pub fn retired_len(&self) -> usize {
        self.retired.borrow().len()
    }

    fn reap_retired(&self) {
        loop {
            let next = self.retired.borrow_mut().pop_front();
            let Some(co) = next else {
                break;
            };
            if let Err(error) = co.cancel() {
                self.sink.report(&error);
            }
        }
    }

    // ------------------------------------------------------------------
    // Fork
    // ------------------------------------------------------------------

    /// Forget every coroutine and queue entry without running anything
    ///
    /// Suspended stacks are abandoned, not unwound. Must not be called
    /// from inside a coroutine.
    pub fn reset_on_fork(&self) {
        let table = std::mem::take(&mut *self.table.borrow_mut());
        let dispatch = std::mem::take(&mut *self.dispatch.borrow_mut());
        let retired = std::mem::take(&mut *self.retired.borrow_mut());
        self.timeouts.borrow_mut().clear();
        drop((table, dispatch, retired));
    }
}

impl std::fmt::Debug for CoroutineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoroutineRegistry")
            .field("live", &self.len())
            .field("dispatch", &self.dispatch_len())
            .field("timeouts", &self.timeout_len())
            .field("retired", &self.retired_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cotick_core::event::{EventName, Payload, Source};
    use cotick_core::state::CoroutineState;

    use crate::clock::ManualClock;
    use crate::config::RuntimeConfig;
    use crate::scheduler::Scheduler;
    use crate::sink::MemorySink;

    struct Rig {
        sched: Rc<Scheduler>,
        clock: Rc<ManualClock>,
        sink: Rc<MemorySink>,
    }

    fn rig() -> Rig {
        let clock = Rc::new(ManualClock::new());
        let sink = Rc::new(MemorySink::new());
        let sched = Scheduler::with_parts(
            RuntimeConfig::new().stack_size(64 * 1024),
            clock.clone(),
            sink.clone(),
        );
        Rig { sched, clock, sink }
    }

    fn parked(sched: &Rc<Scheduler>) -> Coroutine {
        let co = sched.coroutine();
        co.setup(|co| co.suspend().map(|_| ())).unwrap();
        co.execute().unwrap();
        co
    }

    #[test]
    fn test_dispatch_is_fifo() {
        let rig = rig();
        let order = Rc::new(RefCell::new(Vec::new()));

        for i in 0..5 {
            let co = rig.sched.coroutine();
            let o = order.clone();
            co.setup(move |_| {
                o.borrow_mut().push(i);
                Ok(())
            })
            .unwrap();
            co.queue().unwrap();
        }
        assert_eq!(rig.sched.registry().dispatch_len(), 5);

        rig.sched.registry().run_dispatch_queue();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
        assert_eq!(rig.sched.registry().dispatch_len(), 0);
    }

    #[test]
    fn test_dispatch_drains_entries_queued_during_pass() {
        let rig = rig();
        let order = Rc::new(RefCell::new(Vec::new()));

        let parent = rig.sched.coroutine();
        let (o, sched) = (order.clone(), Rc::downgrade(&rig.sched));
        parent
            .setup(move |_| {
                o.borrow_mut().push("parent");
                let sched = sched.upgrade().ok_or(CoError::Detached)?;
                let o2 = o.clone();
                sched.spawn(move |_| {
                    o2.borrow_mut().push("child");
                    Ok(())
                })?;
                Ok(())
            })
            .unwrap();
        parent.queue().unwrap();

        rig.sched.registry().run_dispatch_queue();
        assert_eq!(*order.borrow(), vec!["parent", "child"]);
    }

    #[test]
    fn test_dispatch_reports_and_continues() {
        let rig = rig();
        let ran = Rc::new(Cell::new(false));

        // Queued twice: the second execute fails with InvalidState
        let twice = rig.sched.coroutine();
        twice.setup(|_| Ok(())).unwrap();
        twice.queue().unwrap();
        twice.queue().unwrap();

        let after = rig.sched.coroutine();
        let r = ran.clone();
        after
            .setup(move |_| {
                r.set(true);
                Ok(())
            })
            .unwrap();
        after.queue().unwrap();

        rig.sched.registry().run_dispatch_queue();
        assert!(ran.get());
        assert_eq!(rig.sink.report_count(), 1);
    }

    #[test]
    fn test_resume_by_id_clears_flag_and_ignores_vanished() {
        let rig = rig();
        let co = parked(&rig.sched);
        co.flag("wait");

        let ev = Event::resume(Payload::Empty, Source::Host);
        rig.sched
            .registry()
            .resume_by_id(co.id(), Some(ev), Some("wait"))
            .unwrap();
        assert_eq!(co.flag_count("wait"), 0);
        assert!(co.terminated());

        let ev = Event::resume(Payload::Empty, Source::Host);
        assert!(rig.sched.registry().resume_by_id(co.id(), Some(ev), None).unwrap().is_none());
        rig.sched.registry().throw_by_id(co.id(), CoError::msg("gone"));
        assert_eq!(rig.sink.report_count(), 0);
    }

    #[test]
    fn test_current_inside_and_outside() {
        let rig = rig();
        assert!(rig.sched.registry().current().is_none());

        let seen = Rc::new(Cell::new(None));
        let co = rig.sched.coroutine();
        let (s, sched) = (seen.clone(), Rc::downgrade(&rig.sched));
        co.setup(move |_| {
            let sched = sched.upgrade().ok_or(CoError::Detached)?;
            s.set(sched.registry().current().map(|c| c.id()));
            Ok(())
        })
        .unwrap();
        co.execute().unwrap();

        assert_eq!(seen.get(), Some(co.id()));
    }

    #[test]
    fn test_timeout_fires_exactly_once() {
        let rig = rig();
        let fired = Rc::new(Cell::new(0));

        let co = rig.sched.coroutine();
        let f = fired.clone();
        co.timeout(
            move |e, _| {
                assert!(e.is_timeout());
                f.set(f.get() + 1);
                Ok(())
            },
            Duration::from_secs(10),
        );
        co.setup(|co| co.suspend().map(|_| ())).unwrap();
        co.execute().unwrap();

        for _ in 0..9 {
            rig.clock.advance(Duration::from_secs(1));
            rig.sched.registry().sweep();
        }
        assert_eq!(fired.get(), 0);
        assert_eq!(co.state(), CoroutineState::Suspended);

        for _ in 0..5 {
            rig.clock.advance(Duration::from_secs(1));
            rig.sched.registry().sweep();
        }
        assert_eq!(fired.get(), 1);
        assert!(co.terminated());
        assert!(!co.is_registered());
        assert_eq!(rig.sched.registry().timeout_len(), 0);
    }

    #[test]
    fn test_rearmed_timeout_does_not_block_others() {
        let rig = rig();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let arm = |co: &Coroutine, name: &'static str, secs: u64| {
            let f = fired.clone();
            co.timeout(
                move |_, _| {
                    f.borrow_mut().push(name);
                    Ok(())
                },
                Duration::from_secs(secs),
            );
        };

        let x = parked(&rig.sched);
        arm(&x, "x", 5);
        arm(&x, "x", 100);
        let y = parked(&rig.sched);
        arm(&y, "y", 10);
        assert_eq!(rig.sched.registry().timeout_len(), 3);

        for _ in 0..10 {
            rig.clock.advance(Duration::from_secs(1));
            rig.sched.registry().sweep();
        }
        assert_eq!(*fired.borrow(), vec!["y"]);
        assert!(y.terminated());
        assert_eq!(x.state(), CoroutineState::Suspended);
        assert_eq!(rig.sched.registry().next_timeout(), Some(Duration::from_secs(100)));
    }

    #[test]
    fn test_completed_coroutine_outraces_timeout() {
        let rig = rig();
        let fired = Rc::new(Cell::new(false));

        let co = rig.sched.coroutine();
        let f = fired.clone();
        co.timeout(
            move |_, _| {
                f.set(true);
                Ok(())
            },
            Duration::from_secs(2),
        );
        co.setup(|_| Ok(())).unwrap();
        co.execute().unwrap();

        rig.clock.advance(Duration::from_secs(5));
        rig.sched.registry().sweep();
        assert!(!fired.get());
        assert_eq!(rig.sched.registry().timeout_len(), 0);
    }

    #[test]
    fn test_sweep_stops_at_first_future_deadline() {
        let rig = rig();
        let early = parked(&rig.sched);
        let late = parked(&rig.sched);
        early.timeout(|_, _| Ok(()), Duration::from_secs(1));
        late.timeout(|_, _| Ok(()), Duration::from_secs(30));

        rig.clock.advance(Duration::from_secs(2));
        rig.sched.registry().sweep();

        assert!(early.terminated());
        assert_eq!(late.state(), CoroutineState::Suspended);
        assert_eq!(rig.sched.registry().timeout_len(), 1);
        assert_eq!(rig.sched.registry().next_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_sweep_logs_flagless_coroutine() {
        let rig = rig();
        let co = parked(&rig.sched);
        co.unflag(cotick_core::constants::FLAG_MAIN);

        rig.sched.registry().sweep();
        let infos = rig.sink.infos();
        assert_eq!(infos.len(), 1);
        assert!(infos[0].contains("no pending flags"));
        assert!(infos[0].contains(&co.id().to_string()));
    }

    #[test]
    fn test_armed_timeout_without_deadline_uses_entry() {
        let rig = rig();
        let names = Rc::new(RefCell::new(Vec::new()));

        let co = rig.sched.coroutine();
        let n = names.clone();
        co.on(EventName::Timeout, move |ev, _| {
            n.borrow_mut().push(ev.name().to_string());
            Ok(())
        });
        rig.sched.registry().arm_timeout(co.id(), Duration::from_secs(1));
        co.setup(|co| co.suspend().map(|_| ())).unwrap();
        co.execute().unwrap();

        rig.clock.advance(Duration::from_secs(1));
        rig.sched.registry().sweep();
        assert_eq!(*names.borrow(), vec!["system.coroutine.timeout".to_string()]);
    }

    #[test]
    fn test_reset_on_fork() {
        let rig = rig();
        let a = parked(&rig.sched);
        let b = rig.sched.coroutine();
        b.setup(|_| Ok(())).unwrap();
        b.queue().unwrap();
        a.timeout(|_, _| Ok(()), Duration::from_secs(3));

        rig.sched.registry().reset_on_fork();

        assert!(rig.sched.registry().lookup(a.id()).is_none());
        assert!(rig.sched.registry().lookup(b.id()).is_none());
        assert!(rig.sched.registry().is_empty());
        assert_eq!(rig.sched.registry().dispatch_len(), 0);
        assert_eq!(rig.sched.registry().timeout_len(), 0);

        rig.clock.advance(Duration::from_secs(10));
        rig.sched.registry().sweep();
        assert_eq!(rig.sink.report_count(), 0);
        assert_eq!(b.state(), CoroutineState::Ready);
    }
}
