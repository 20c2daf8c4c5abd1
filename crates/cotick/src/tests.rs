//! End-to-end scenarios on a manual clock

use super::*;
use std::cell::RefCell;

struct Harness {
    rt: Runtime,
    clock: Rc<ManualClock>,
    sink: Rc<MemorySink>,
}

fn harness() -> Harness {
    let clock = Rc::new(ManualClock::new());
    let sink = Rc::new(MemorySink::new());
    let config = RuntimeConfig::new()
        .stack_size(64 * 1024)
        .tick_interval(Duration::from_millis(1));
    let rt = Runtime::with_parts(config, clock.clone(), sink.clone()).unwrap();
    Harness { rt, clock, sink }
}

impl Harness {
    /// Tick at the current time, then advance one time unit
    fn step(&self) {
        self.rt.tick();
        self.clock.advance(Duration::from_secs(1));
    }

    fn steps(&self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

type Log = Rc<RefCell<Vec<(&'static str, u64)>>>;

fn sender(log: &Log, clock: &Rc<ManualClock>, name: &'static str, delay: u64) -> Coroutine {
    let (log, clock) = (log.clone(), clock.clone());
    spawn_async(move |_| {
        sleep(secs(delay))?;
        log.borrow_mut().push((name, clock.now().as_secs()));
        Ok(())
    })
    .unwrap()
}

#[test]
fn test_two_sleepers_send_in_order() {
    let h = harness();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let fired = Rc::new(Cell::new(0));

    let a = sender(&log, &h.clock, "A", 3);
    let b = sender(&log, &h.clock, "B", 5);
    let f = fired.clone();
    b.timeout(
        move |_, _| {
            f.set(f.get() + 1);
            Ok(())
        },
        secs(10),
    );

    h.steps(3);
    assert!(log.borrow().is_empty());
    assert!(a.is_registered());

    h.step();
    assert_eq!(*log.borrow(), vec![("A", 3)]);
    assert!(!a.is_registered());
    assert!(b.is_registered());

    h.steps(2);
    assert_eq!(*log.borrow(), vec![("A", 3), ("B", 5)]);
    assert!(!b.is_registered());

    h.steps(10);
    assert_eq!(fired.get(), 0);
    assert!(h.rt.is_idle());
    assert_eq!(h.sink.report_count(), 0);
}

#[test]
fn test_hung_coroutine_times_out_exactly_once() {
    let h = harness();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let fired = Rc::new(RefCell::new(Vec::new()));

    let b = sender(&log, &h.clock, "B", 100);
    let (f, c) = (fired.clone(), h.clock.clone());
    b.timeout(
        move |err, _| {
            assert!(err.is_timeout());
            f.borrow_mut().push(c.now().as_secs());
            Ok(())
        },
        secs(10),
    );

    h.steps(10);
    assert!(fired.borrow().is_empty());

    h.step();
    assert_eq!(*fired.borrow(), vec![10]);
    assert!(!b.is_registered());
    assert!(b.terminated());

    h.steps(20);
    assert_eq!(*fired.borrow(), vec![10]);
    assert!(log.borrow().is_empty());
    assert_eq!(h.sink.report_count(), 0);
}

#[test]
fn test_unhandled_exception_reported_once() {
    let h = harness();
    let co = spawn_async(|_| Err(CoError::msg("boom"))).unwrap();

    h.step();
    assert_eq!(h.sink.reports(), vec!["boom".to_string()]);
    assert!(!co.is_registered());

    h.steps(3);
    assert_eq!(h.sink.report_count(), 1);
}

#[test]
fn test_except_handler_receives_error() {
    let h = harness();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let co = spawn_async(|_| Err(CoError::msg("bad input"))).unwrap();
    let s = seen.clone();
    co.except(move |err, _| {
        s.borrow_mut().push(err.to_string());
        Ok(())
    });

    h.step();
    assert_eq!(*seen.borrow(), vec!["bad input".to_string()]);
    assert_eq!(h.sink.report_count(), 0);
}

#[test]
fn test_spawn_order_is_fifo() {
    let h = harness();
    let order = Rc::new(RefCell::new(Vec::new()));

    for i in 0..5 {
        let o = order.clone();
        spawn_async(move |_| {
            o.borrow_mut().push(i);
            Ok(())
        })
        .unwrap();
    }

    h.step();
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_deferred_failure_does_not_skip_later_actions() {
    let h = harness();
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    let co = spawn_async(move |_| {
        l.borrow_mut().push("body".to_string());
        Ok(())
    })
    .unwrap();

    let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
    co.defer(move |_| {
        l1.borrow_mut().push("first".to_string());
        Err(CoError::msg("cleanup failed"))
    })
    .defer(move |_| {
        l2.borrow_mut().push("second".to_string());
        Ok(())
    })
    .except(move |err, _| {
        l3.borrow_mut().push(format!("caught: {}", err));
        Ok(())
    });

    h.step();
    assert_eq!(
        *log.borrow(),
        vec!["body", "first", "caught: cleanup failed", "second"]
    );
    assert!(!co.is_registered());
}

#[test]
fn test_panicking_body_is_contained() {
    let h = harness();
    let survivor = Rc::new(Cell::new(false));

    spawn_async(|_| panic!("kaboom")).unwrap();
    let s = survivor.clone();
    spawn_async(move |_| {
        s.set(true);
        Ok(())
    })
    .unwrap();

    h.step();
    assert!(survivor.get());
    assert_eq!(h.sink.reports(), vec!["coroutine panicked: kaboom".to_string()]);
}

#[test]
fn test_pending_flag_parks_until_lowered() {
    let h = harness();
    let co = spawn_async(|co| {
        co.flag("io");
        Ok(())
    })
    .unwrap();

    h.step();
    assert!(co.is_registered());
    assert_eq!(co.state(), CoroutineState::Suspended);
    assert_eq!(co.pending_flags(), vec!["io".to_string()]);

    co.unflag("io");
    let out = co
        .resume(Some(Event::new("io.done", Payload::Empty, Source::Host)))
        .unwrap()
        .unwrap();
    assert!(out.is(&EventName::End));
    assert!(!co.is_registered());

    h.step();
    assert!(co.terminated());
}

#[test]
fn test_fork_resets_inherited_state() {
    let h = harness();
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    sender(&log, &h.clock, "A", 3);
    spawn_async(|_| Ok(())).unwrap();
    h.rt.scheduler().registry().run_dispatch_queue();
    spawn_async(|_| Ok(())).unwrap();
    assert!(!h.rt.is_idle());

    assert!(!h.rt.detect_fork(getpid()));
    assert!(!h.rt.is_idle());

    let child = Pid::from_raw(getpid().as_raw() + 1);
    assert!(h.rt.detect_fork(child));
    assert!(h.rt.is_idle());

    h.clock.advance(secs(5));
    h.rt.scheduler().tick();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_current_inside_and_outside() {
    let h = harness();
    assert!(current().is_none());
    assert!(!is_in_coroutine());

    let seen = Rc::new(RefCell::new(None));
    let s = seen.clone();
    let co = spawn_async(move |_| {
        assert!(is_in_coroutine());
        *s.borrow_mut() = current().map(|c| c.id());
        Ok(())
    })
    .unwrap();

    h.step();
    assert_eq!(*seen.borrow(), Some(co.id()));
    assert!(current().is_none());
}

#[test]
fn test_nested_spawn_runs_same_tick() {
    let h = harness();
    let order = Rc::new(RefCell::new(Vec::new()));

    let o = order.clone();
    spawn_async(move |_| {
        o.borrow_mut().push("parent");
        let o2 = o.clone();
        spawn_async(move |_| {
            o2.borrow_mut().push("child");
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();

    h.step();
    assert_eq!(*order.borrow(), vec!["parent", "child"]);
}

#[test]
fn test_sleep_outside_coroutine_blocks() {
    let _h = harness();
    let out = sleep(Duration::from_millis(1)).unwrap();
    assert!(out.is_empty());
}

#[test]
fn test_run_until_idle() {
    let h = harness();
    let done = Rc::new(Cell::new(false));
    let d = done.clone();
    spawn_async(move |_| {
        d.set(true);
        Ok(())
    })
    .unwrap();

    assert!(h.rt.run_until_idle(5));
    assert!(done.get());
}

#[test]
fn test_spawn_without_runtime_detached() {
    let h = harness();
    drop(h);
    assert!(matches!(spawn_async(|_| Ok(())), Err(CoError::Detached)));
}

#[test]
fn test_invalid_config_rejected() {
    let config = RuntimeConfig::new().stack_size(1024);
    assert!(Runtime::with_config(config).is_err());
}
