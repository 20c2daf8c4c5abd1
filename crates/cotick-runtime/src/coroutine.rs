//! Coroutine entity
//!
//! A [`Coroutine`] wraps a stackful continuation with the bookkeeping the
//! scheduler needs: identity, reference-counted pending flags, a handler
//! table keyed by event name, deferred cleanup actions and an optional
//! timeout deadline.
//!
//! # Lifecycle
//!
//! ```text
//!   Created --setup--> Ready --execute--> Running <--resume/suspend--> Suspended
//!                                            |
//!                                    body returns or fails
//!                                            v
//!                         finalize: unflag main, run deferred actions,
//!                         suspend once more if flags remain, destroy
//! ```
//!
//! Failures raised by the body, a deferred action or a handler never
//! propagate: they are converged into the `timeout` or `exception` event
//! and dispatched through the coroutine's own handler table.

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use cotick_core::constants::{FLAG_EXCEPTION, FLAG_MAIN};
use cotick_core::error::{CoError, CoResult};
use cotick_core::event::{Event, EventName, Payload, Source};
use cotick_core::flags::FlagSet;
use cotick_core::id::CoroutineId;
use cotick_core::state::CoroutineState;
use cotick_core::kerror;

use crate::continuation::{cancel_unwind, catch, Continuation, Status, Transfer};
use crate::scheduler::Scheduler;
use crate::tls;

/// Event handler: receives the event (payload via `event.data()`) and the
/// coroutine it was delivered to
pub type Handler = Rc<dyn Fn(&Event, &Coroutine) -> CoResult<()>>;

type Deferred = Box<dyn FnOnce(&Coroutine) -> CoResult<()>>;

/// Handle to a coroutine
///
/// Cloning is cheap and yields another handle to the same coroutine.
#[derive(Clone)]
pub struct Coroutine(Rc<CoroutineInner>);

struct CoroutineInner {
    id: CoroutineId,
    sched: Weak<Scheduler>,
    continuation: OnceCell<Box<Continuation>>,
    handlers: RefCell<HashMap<EventName, Handler>>,
    deferred: RefCell<Vec<Deferred>>,
    timeout_deadline: Cell<Option<Duration>>,
    flags: RefCell<FlagSet>,
    exception_depth: Cell<u32>,
}

impl Coroutine {
    pub(crate) fn new(sched: Weak<Scheduler>) -> Self {
        Coroutine(Rc::new(CoroutineInner {
            id: CoroutineId::next(),
            sched,
            continuation: OnceCell::new(),
            handlers: RefCell::new(HashMap::new()),
            deferred: RefCell::new(Vec::new()),
            timeout_deadline: Cell::new(None),
            flags: RefCell::new(FlagSet::new()),
            exception_depth: Cell::new(0),
        }))
    }

    #[inline]
    pub fn id(&self) -> CoroutineId {
        self.0.id
    }

    /// Owning scheduler, if it still exists
    #[inline]
    pub fn scheduler(&self) -> Option<Rc<Scheduler>> {
        self.0.sched.upgrade()
    }

    fn sched(&self) -> CoResult<Rc<Scheduler>> {
        self.scheduler().ok_or(CoError::Detached)
    }

    fn continuation(&self) -> CoResult<&Continuation> {
        self.0
            .continuation
            .get()
            .map(|c| &**c)
            .ok_or(CoError::NotSetup)
    }

    // ------------------------------------------------------------------
    // Setup and driving
    // ------------------------------------------------------------------

    /// Install `body` as the coroutine's entry point
    ///
    /// Maps the stack, raises the main flag and registers the coroutine.
    /// Fails with `AlreadySetup` on a second call.
    pub fn setup<F>(&self, body: F) -> CoResult<&Self>
    where
        F: FnOnce(&Coroutine) -> CoResult<()> + 'static,
    {
        if self.0.continuation.get().is_some() {
            return Err(CoError::AlreadySetup);
        }
        let sched = self.sched()?;

        let weak = Rc::downgrade(&self.0);
        let entry = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Coroutine(inner).entrance(body);
            }
        });
        let cont = Continuation::new(sched.config().stack_size, entry)?;
        if self.0.continuation.set(cont).is_err() {
            return Err(CoError::AlreadySetup);
        }

        self.flag(FLAG_MAIN);
        sched.registry().register(self);
        sched.trace(format_args!("setup {}", self.id()));
        Ok(self)
    }

    /// Start the body on the caller's stack
    ///
    /// Returns the first event the body yields, or `None` if it ran to
    /// completion without suspending.
    pub fn execute(&self) -> CoResult<Option<Event>> {
        let cont = self.continuation()?;
        self.trace(format_args!("execute {}", self.id()));
        self.enter(|| cont.start())
    }

    /// Put the coroutine on the dispatch queue for the next scheduling pass
    pub fn queue(&self) -> CoResult<&Self> {
        self.continuation()?;
        self.sched()?.registry().schedule(self);
        Ok(self)
    }

    /// Resume at the last suspension point, delivering `event`
    ///
    /// A `resume`-named event makes the pending `suspend()` return its
    /// payload; any other event goes through the handler table first.
    pub fn resume(&self, event: Option<Event>) -> CoResult<Option<Event>> {
        let cont = self.continuation()?;
        self.trace(format_args!(
            "resume {} with {}",
            self.id(),
            event.as_ref().map_or("<none>", |e| e.name().as_str())
        ));
        self.enter(|| cont.resume(Transfer::Resume(event)))
    }

    /// Inject `error` at the current suspension point
    ///
    /// Whatever escapes the injection goes to the diagnostic sink; the
    /// caller never sees it.
    pub fn throw(&self, error: CoError) {
        self.trace(format_args!("throw into {}: {}", self.id(), error));
        let result = match self.continuation() {
            Ok(cont) => self.enter(|| cont.resume(Transfer::Throw(error))).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.report(&e);
        }
    }

    /// Unwind a suspended stack without running handlers or deferred actions
    pub(crate) fn cancel(&self) -> CoResult<()> {
        let cont = self.continuation()?;
        if cont.status() != Status::Suspended {
            return Ok(());
        }
        self.trace(format_args!("cancel {}", self.id()));
        self.enter(|| cont.resume(Transfer::Cancel)).map(|_| ())
    }

    fn enter<T>(&self, f: impl FnOnce() -> CoResult<T>) -> CoResult<T> {
        tls::push_running(self);
        let result = f();
        tls::pop_running();
        result
    }

    // ------------------------------------------------------------------
    // Inside the coroutine
    // ------------------------------------------------------------------

    /// Yield to the resumer and wait for a `resume` event
    ///
    /// Other events are dispatched to their handlers and the wait goes on.
    /// If handling leaves no flag raised, the coroutine destroys itself and
    /// yields a terminal `end` event instead.
    ///
    /// Errors: the error injected by [`Coroutine::throw`], or
    /// `ProtocolViolation` when resumed without an event. Only callable
    /// from the coroutine's own body.
    pub fn suspend(&self) -> CoResult<Payload> {
        let cont = self.continuation()?;
        if !tls::is_running(self.id()) {
            return Err(CoError::InvalidState("suspend called outside the coroutine"));
        }

        loop {
            let event = match cont.suspend(Event::suspend(self.id())) {
                Transfer::Resume(Some(event)) => event,
                Transfer::Resume(None) => {
                    return Err(CoError::ProtocolViolation("resumed without an event"))
                }
                Transfer::Throw(error) => return Err(error),
                Transfer::Cancel => cancel_unwind(),
            };

            if event.is(&EventName::Resume) {
                return Ok(event.into_data());
            }

            self.handle_event(&event);

            if !self.has_pending_flags() {
                self.destroy_inner(true);
                return match cont.suspend(Event::end(self.id())) {
                    Transfer::Throw(error) => Err(error),
                    Transfer::Cancel => cancel_unwind(),
                    Transfer::Resume(_) => Ok(Payload::Empty),
                };
            }
        }
    }

    fn entrance<F>(&self, body: F)
    where
        F: FnOnce(&Coroutine) -> CoResult<()>,
    {
        if let Err(error) = catch(|| body(self)) {
            self.process_exception(error);
        }
        self.unflag(FLAG_MAIN);
        self.finalize();
    }

    fn finalize(&self) {
        self.run_deferred();
        if self.has_pending_flags() {
            if let Err(error) = self.suspend() {
                self.process_exception(error);
            }
        }
        self.destroy_inner(false);
    }

    fn run_deferred(&self) {
        let actions = std::mem::take(&mut *self.0.deferred.borrow_mut());
        for action in actions {
            if let Err(error) = catch(|| action(self)) {
                self.process_exception(error);
            }
        }
    }

    /// Converge `error` into the `timeout` or `exception` event
    fn process_exception(&self, error: CoError) {
        let depth = self.0.exception_depth.get();
        if depth >= self.max_exception_depth() {
            self.report(&error);
            return;
        }

        let name = if error.is_timeout() {
            EventName::Timeout
        } else {
            EventName::Exception
        };
        let event = Event::new(name, Payload::Fault(error), Source::Coroutine(self.id()));

        self.0.exception_depth.set(depth + 1);
        self.flag(FLAG_EXCEPTION);
        self.handle_event(&event);
        self.unflag(FLAG_EXCEPTION);
        self.0.exception_depth.set(depth);
    }

    /// Dispatch `event` to its handler
    ///
    /// Handler failures are converged, never propagated. Without a handler
    /// a fault payload goes to the diagnostic sink.
    pub fn handle_event(&self, event: &Event) {
        let handler = self.0.handlers.borrow().get(event.name()).cloned();
        match handler {
            Some(handler) => {
                if let Err(error) = catch(|| handler(event, self)) {
                    self.process_exception(error);
                }
            }
            None => {
                if let Some(fault) = event.data().fault() {
                    self.report(fault);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Configuration (chainable, usable before the first run)
    // ------------------------------------------------------------------

    /// Register the handler for `name`, replacing any previous one
    pub fn on<F>(&self, name: impl Into<EventName>, handler: F) -> &Self
    where
        F: Fn(&Event, &Coroutine) -> CoResult<()> + 'static,
    {
        self.0
            .handlers
            .borrow_mut()
            .insert(name.into(), Rc::new(handler));
        self
    }

    /// Arm a timeout `after` from now and register its handler
    pub fn timeout<F>(&self, handler: F, after: Duration) -> &Self
    where
        F: Fn(&CoError, &Coroutine) -> CoResult<()> + 'static,
    {
        if let Some(sched) = self.scheduler() {
            self.0.timeout_deadline.set(Some(sched.now() + after));
            sched.registry().arm_timeout(self.id(), after);
        }
        self.on(
            EventName::Timeout,
            fault_handler(handler, || CoError::TimeoutExceeded),
        )
    }

    /// Register the handler exceptions converge to
    pub fn except<F>(&self, handler: F) -> &Self
    where
        F: Fn(&CoError, &Coroutine) -> CoResult<()> + 'static,
    {
        self.on(
            EventName::Exception,
            fault_handler(handler, || {
                CoError::ProtocolViolation("exception event without a fault")
            }),
        )
    }

    /// Append a cleanup action, run in registration order at finalization
    pub fn defer<F>(&self, action: F) -> &Self
    where
        F: FnOnce(&Coroutine) -> CoResult<()> + 'static,
    {
        self.0.deferred.borrow_mut().push(Box::new(action));
        self
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    pub fn flag(&self, name: &str) {
        self.0.flags.borrow_mut().raise(name);
    }

    pub fn unflag(&self, name: &str) {
        self.0.flags.borrow_mut().lower(name);
    }

    pub fn flag_count(&self, name: &str) -> u32 {
        self.0.flags.borrow().count(name)
    }

    pub fn has_pending_flags(&self) -> bool {
        !self.0.flags.borrow().is_empty()
    }

    /// Raised flag names, sorted
    pub fn pending_flags(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.flags.borrow().names().map(str::to_string).collect();
        names.sort();
        names
    }

    // ------------------------------------------------------------------
    // Introspection and teardown
    // ------------------------------------------------------------------

    /// True once the continuation has run to completion
    pub fn terminated(&self) -> bool {
        self.0
            .continuation
            .get()
            .is_some_and(|c| c.is_terminated())
    }

    pub fn state(&self) -> CoroutineState {
        match self.0.continuation.get().map(|c| c.status()) {
            None => CoroutineState::Created,
            Some(Status::Fresh) => CoroutineState::Ready,
            Some(Status::Running) => CoroutineState::Running,
            Some(Status::Suspended) => CoroutineState::Suspended,
            Some(Status::Terminated) => CoroutineState::Finished,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.scheduler()
            .is_some_and(|s| s.registry().contains(self.id()))
    }

    /// Absolute deadline set by [`Coroutine::timeout`]
    pub fn timeout_deadline(&self) -> Option<Duration> {
        self.0.timeout_deadline.get()
    }

    /// Remove from the registry (idempotent)
    ///
    /// A coroutine destroyed while suspended has its stack unwound at the
    /// next sweep.
    pub fn destroy(&self) {
        let suspended = self.state() == CoroutineState::Suspended;
        self.destroy_inner(suspended);
    }

    fn destroy_inner(&self, retire: bool) {
        if let Some(sched) = self.scheduler() {
            let removed = sched.registry().unregister(self);
            if removed {
                sched.trace(format_args!("destroy {}", self.id()));
                if retire {
                    sched.registry().retire(self.clone());
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn report(&self, error: &CoError) {
        match self.scheduler() {
            Some(sched) => sched.sink().report(error),
            None => kerror!("{}: {}", self.id(), error),
        }
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        if let Some(sched) = self.scheduler() {
            sched.trace(args);
        }
    }

    fn max_exception_depth(&self) -> u32 {
        self.scheduler()
            .map_or(1, |s| s.config().max_exception_depth)
    }
}

fn fault_handler<F>(
    handler: F,
    fallback: fn() -> CoError,
) -> impl Fn(&Event, &Coroutine) -> CoResult<()> + 'static
where
    F: Fn(&CoError, &Coroutine) -> CoResult<()> + 'static,
{
    move |event: &Event, co: &Coroutine| match event.data().fault() {
        Some(error) => handler(error, co),
        None => handler(&fallback(), co),
    }
}

impl PartialEq for Coroutine {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Coroutine {}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("flags", &self.pending_flags())
            .finish()
    }
}
