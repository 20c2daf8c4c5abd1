//! Stackful continuation primitive
//!
//! A [`Continuation`] runs a closure on its own mmap'd stack. The resumer
//! and the continuation hand control back and forth through
//! [`switch_context`]; values travel through single-slot mailboxes on the
//! continuation itself.
//!
//! ```text
//!   resumer                          continuation stack
//!   -------                          ------------------
//!   start() ───────────────────────▶ entry closure runs
//!           ◀─────────────────────── suspend(ev)  (ev returned to resumer)
//!   resume(t) ─────────────────────▶ suspend returns t
//!           ◀─────────────────────── closure returns (Terminated)
//! ```
//!
//! Panics never cross the stack boundary: the entry catches them and the
//! resumer sees `CoError::Panicked`.

use std::cell::{Cell, UnsafeCell};
use std::panic::{self, AssertUnwindSafe};

use cotick_core::constants::MIN_STACK_SIZE;
use cotick_core::error::{CoError, CoResult, MemoryError};
use cotick_core::event::Event;

use crate::arch::{init_context, switch_context, SavedRegs};
use crate::memory::Stack;

/// What a resumer hands to a suspended continuation
pub(crate) enum Transfer {
    /// Wake up with an event (`None` is a protocol violation upstream)
    Resume(Option<Event>),
    /// Inject an error at the suspension point
    Throw(CoError),
    /// Unwind the stack without running handlers
    Cancel,
}

/// Unwind payload used by [`Transfer::Cancel`]
pub(crate) struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Fresh,
    Running,
    Suspended,
    Terminated,
}

pub(crate) struct Continuation {
    stack: Stack,
    regs: UnsafeCell<SavedRegs>,
    caller: UnsafeCell<SavedRegs>,
    status: Cell<Status>,
    entry: Cell<Option<Box<dyn FnOnce()>>>,
    inbound: Cell<Option<Transfer>>,
    outbound: Cell<Option<Event>>,
    escaped: Cell<Option<CoError>>,
}

impl Continuation {
    /// Map a stack and prepare `f` to run on it
    ///
    /// Boxed so the address handed to the entry trampoline stays valid.
    /// Fails with `MemoryError::TooSmall` below `MIN_STACK_SIZE`.
    pub(crate) fn new(stack_size: usize, f: Box<dyn FnOnce()>) -> CoResult<Box<Self>> {
        if stack_size < MIN_STACK_SIZE {
            return Err(MemoryError::TooSmall.into());
        }
        let stack = Stack::allocate(stack_size)?;
        let cont = Box::new(Continuation {
            stack,
            regs: UnsafeCell::new(SavedRegs::default()),
            caller: UnsafeCell::new(SavedRegs::default()),
            status: Cell::new(Status::Fresh),
            entry: Cell::new(Some(f)),
            inbound: Cell::new(None),
            outbound: Cell::new(None),
            escaped: Cell::new(None),
        });

        let arg = &*cont as *const Continuation as usize;
        unsafe {
            init_context(cont.regs.get(), cont.stack.top(), continuation_entry, arg);
        }
        Ok(cont)
    }

    #[inline]
    pub(crate) fn status(&self) -> Status {
        self.status.get()
    }

    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.status.get() == Status::Terminated
    }

    /// Run from the beginning until the first suspension or completion
    ///
    /// `Ok(Some(ev))` is the event yielded at a suspension point,
    /// `Ok(None)` means the closure ran to completion.
    pub(crate) fn start(&self) -> CoResult<Option<Event>> {
        match self.status.get() {
            Status::Fresh => self.switch_in(),
            Status::Terminated => Err(CoError::InvalidState("continuation already finished")),
            _ => Err(CoError::InvalidState("continuation already started")),
        }
    }

    /// Continue a suspended continuation, delivering `transfer`
    pub(crate) fn resume(&self, transfer: Transfer) -> CoResult<Option<Event>> {
        match self.status.get() {
            Status::Suspended => {
                self.inbound.set(Some(transfer));
                self.switch_in()
            }
            Status::Fresh => Err(CoError::InvalidState("continuation not started")),
            Status::Running => Err(CoError::InvalidState("continuation is running")),
            Status::Terminated => Err(CoError::InvalidState("continuation already finished")),
        }
    }

    /// Park the running continuation, yielding `event` to its resumer
    ///
    /// Must be called on this continuation's own stack.
    pub(crate) fn suspend(&self, event: Event) -> Transfer {
        debug_assert_eq!(self.status.get(), Status::Running);
        self.outbound.set(Some(event));
        self.status.set(Status::Suspended);
        unsafe { switch_context(self.regs.get(), self.caller.get()) };
        // Resumed: resume() filled the mailbox before switching in
        self.inbound.take().unwrap_or(Transfer::Resume(None))
    }

    fn switch_in(&self) -> CoResult<Option<Event>> {
        self.status.set(Status::Running);
        unsafe { switch_context(self.caller.get(), self.regs.get()) };

        if let Some(err) = self.escaped.take() {
            return Err(err);
        }
        match self.status.get() {
            Status::Terminated => Ok(None),
            _ => Ok(self.outbound.take()),
        }
    }
}

extern "C" fn continuation_entry(arg: usize) -> ! {
    // SAFETY: `arg` is the boxed continuation, which outlives its stack
    let cont = unsafe { &*(arg as *const Continuation) };

    if let Some(f) = cont.entry.take() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            if !payload.is::<Cancelled>() {
                cont.escaped.set(Some(CoError::from_panic(payload)));
            }
        }
    }

    cont.status.set(Status::Terminated);
    unsafe { switch_context(cont.regs.get(), cont.caller.get()) };

    // A terminated continuation is never switched into again
    std::process::abort()
}

/// Run `f`, converting a panic into `CoError::Panicked`
///
/// Cancellation unwinds are re-raised so they reach the continuation entry.
pub(crate) fn catch<T>(f: impl FnOnce() -> CoResult<T>) -> CoResult<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) if payload.is::<Cancelled>() => panic::resume_unwind(payload),
        Err(payload) => Err(CoError::from_panic(payload)),
    }
}

/// Begin unwinding the current continuation's stack
pub(crate) fn cancel_unwind() -> ! {
    panic::resume_unwind(Box::new(Cancelled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use cotick_core::event::{EventName, Payload, Source};
    use cotick_core::id::CoroutineId;

    const STACK: usize = 64 * 1024;

    fn ping(n: u32) -> Event {
        Event::new("ping", Payload::value(n), Source::Host)
    }

    #[test]
    fn test_run_to_completion() {
        let hit = Rc::new(Cell::new(false));
        let h = hit.clone();
        let cont = Continuation::new(STACK, Box::new(move || h.set(true))).unwrap();

        assert_eq!(cont.status(), Status::Fresh);
        assert!(cont.start().unwrap().is_none());
        assert!(hit.get());
        assert!(cont.is_terminated());
    }

    #[test]
    fn test_suspend_resume_round_trip() {
        let slot: Rc<Cell<*const Continuation>> = Rc::new(Cell::new(std::ptr::null()));
        let seen = Rc::new(Cell::new(0u32));

        let (s, out) = (slot.clone(), seen.clone());
        let cont = Continuation::new(
            STACK,
            Box::new(move || {
                let me = unsafe { &*s.get() };
                for i in 0..3 {
                    match me.suspend(ping(i)) {
                        Transfer::Resume(Some(ev)) => {
                            out.set(out.get() + ev.data().get::<u32>().copied().unwrap_or(0))
                        }
                        _ => return,
                    }
                }
            }),
        )
        .unwrap();
        slot.set(&*cont);

        let first = cont.start().unwrap().unwrap();
        assert_eq!(first.name(), &EventName::from("ping"));
        assert_eq!(cont.status(), Status::Suspended);

        assert!(cont.resume(Transfer::Resume(Some(ping(10)))).unwrap().is_some());
        assert!(cont.resume(Transfer::Resume(Some(ping(20)))).unwrap().is_some());
        assert!(cont.resume(Transfer::Resume(Some(ping(30)))).unwrap().is_none());
        assert_eq!(seen.get(), 60);
        assert!(cont.is_terminated());
    }

    #[test]
    fn test_panic_is_contained() {
        let cont = Continuation::new(STACK, Box::new(|| panic!("boom"))).unwrap();
        match cont.start() {
            Err(CoError::Panicked(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert!(cont.is_terminated());
    }

    #[test]
    fn test_invalid_transitions() {
        let cont = Continuation::new(STACK, Box::new(|| {})).unwrap();
        assert!(matches!(
            cont.resume(Transfer::Resume(None)),
            Err(CoError::InvalidState(_))
        ));

        cont.start().unwrap();
        assert!(matches!(cont.start(), Err(CoError::InvalidState(_))));
        assert!(matches!(
            cont.resume(Transfer::Cancel),
            Err(CoError::InvalidState(_))
        ));
    }

    #[test]
    fn test_cancel_unwinds_stack() {
        struct Guard(Rc<Cell<bool>>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let slot: Rc<Cell<*const Continuation>> = Rc::new(Cell::new(std::ptr::null()));
        let dropped = Rc::new(Cell::new(false));

        let (s, d) = (slot.clone(), dropped.clone());
        let cont = Continuation::new(
            STACK,
            Box::new(move || {
                let _guard = Guard(d);
                let me = unsafe { &*s.get() };
                if let Transfer::Cancel = me.suspend(Event::suspend(CoroutineId::from_raw(1))) {
                    cancel_unwind();
                }
            }),
        )
        .unwrap();
        slot.set(&*cont);

        cont.start().unwrap();
        assert!(!dropped.get());

        // Cancellation is silent: no error surfaces
        assert!(cont.resume(Transfer::Cancel).unwrap().is_none());
        assert!(dropped.get());
        assert!(cont.is_terminated());
    }

    #[test]
    fn test_undersized_stack_rejected() {
        for size in [0, 4096, MIN_STACK_SIZE - 1] {
            let r = Continuation::new(size, Box::new(|| {}));
            assert!(matches!(r, Err(CoError::Memory(MemoryError::TooSmall))));
        }
        assert!(Continuation::new(MIN_STACK_SIZE, Box::new(|| {})).is_ok());
    }

    #[test]
    fn test_catch_converts_panics() {
        let r: CoResult<()> = catch(|| panic!("inner"));
        assert!(matches!(r, Err(CoError::Panicked(ref m)) if m == "inner"));

        let r = catch(|| Ok(5));
        assert_eq!(r.ok(), Some(5));
    }
}
