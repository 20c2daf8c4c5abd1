//! Scheduler context
//!
//! Owns the pieces one host tick drives: the coroutine registry, the timer
//! service, the clock they share and the diagnostic sink failures go to.
//! Coroutines hold a weak handle back to it.
//!
//! A tick runs, in order:
//!
//! 1. timer heartbeat (due sleeps resume their coroutines)
//! 2. dispatch queue (newly spawned coroutines start)
//! 3. sweep (timeouts enforced, finished entries reaped)

use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use cotick_core::error::CoResult;
use cotick_core::event::Payload;
use cotick_core::traits::{Clock, DiagnosticSink};
use cotick_core::kdebug;

use crate::clock::MonotonicClock;
use crate::config::RuntimeConfig;
use crate::coroutine::Coroutine;
use crate::registry::CoroutineRegistry;
use crate::sink::KprintSink;
use crate::timer::TimerService;

pub struct Scheduler {
    config: RuntimeConfig,
    clock: Rc<dyn Clock>,
    sink: Rc<dyn DiagnosticSink>,
    registry: CoroutineRegistry,
    timers: TimerService,
    this: Weak<Scheduler>,
}

impl Scheduler {
    /// Create a scheduler on the monotonic clock, reporting through kprint
    pub fn new(config: RuntimeConfig) -> Rc<Self> {
        Self::with_parts(config, Rc::new(MonotonicClock::new()), Rc::new(KprintSink))
    }

    /// Create a scheduler with an explicit clock and diagnostic sink
    pub fn with_parts(
        config: RuntimeConfig,
        clock: Rc<dyn Clock>,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Scheduler {
            registry: CoroutineRegistry::new(clock.clone(), sink.clone()),
            timers: TimerService::new(clock.clone(), sink.clone()),
            config,
            clock,
            sink,
            this: this.clone(),
        })
    }

    /// A fresh coroutine bound to this scheduler; not yet set up
    pub fn coroutine(&self) -> Coroutine {
        Coroutine::new(self.this.clone())
    }

    /// Create, set up and enqueue a coroutine for the next dispatch pass
    ///
    /// The returned handle may still be configured (`defer`, `timeout`,
    /// `except`) before the coroutine first runs.
    pub fn spawn<F>(&self, body: F) -> CoResult<Coroutine>
    where
        F: FnOnce(&Coroutine) -> CoResult<()> + 'static,
    {
        let co = self.coroutine();
        co.setup(body)?.queue()?;
        self.trace(format_args!("spawn {}", co.id()));
        Ok(co)
    }

    /// Suspend the current coroutine for `duration`
    ///
    /// Outside a coroutine this blocks the thread.
    pub fn sleep(&self, duration: Duration) -> CoResult<Payload> {
        self.timers.sleep(&self.registry, duration)
    }

    /// The registered coroutine running on the caller's stack
    pub fn current(&self) -> Option<Coroutine> {
        self.registry.current()
    }

    /// One host tick: heartbeat, dispatch, sweep
    pub fn tick(&self) {
        self.trace(format_args!("tick at {:?}", self.now()));
        self.timers.heartbeat(&self.registry);
        self.registry.run_dispatch_queue();
        self.registry.sweep();
    }

    /// Forget every coroutine, queued start, timeout and timer
    pub fn reset_on_fork(&self) {
        self.trace(format_args!("reset after fork"));
        self.registry.reset_on_fork();
        self.timers.reset_on_fork();
    }

    /// Nothing registered, queued or sleeping
    pub fn is_idle(&self) -> bool {
        self.registry.is_empty() && self.registry.dispatch_len() == 0 && self.timers.is_empty()
    }

    #[inline]
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &CoroutineRegistry {
        &self.registry
    }

    #[inline]
    pub fn timers(&self) -> &TimerService {
        &self.timers
    }

    #[inline]
    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    #[inline]
    pub fn sink(&self) -> &Rc<dyn DiagnosticSink> {
        &self.sink
    }

    pub(crate) fn trace(&self, args: fmt::Arguments<'_>) {
        if self.config.debug_logging {
            kdebug!("{}", args);
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("registry", &self.registry)
            .field("timers", &self.timers)
            .finish()
    }
}
