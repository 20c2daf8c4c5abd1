//! # cotick - Cooperative Tick-driven Coroutines
//!
//! Single-threaded stackful coroutines multiplexed onto the caller's thread
//! and driven by a periodic host tick.
//!
//! ## Features
//!
//! - **Stackful**: each coroutine runs on its own mmap'd stack with a guard page
//! - **Voluntary suspension**: `sleep` parks a coroutine until a later tick
//! - **Timeouts**: a deadline converges into the coroutine's `timeout` handler
//! - **Structured cleanup**: `defer` actions run in order when the body ends
//! - **Exception convergence**: failures become `exception` events, never
//!   unwinding into the host
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::time::Duration;
//! use cotick::{sleep, spawn_async, Runtime};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::new()?;
//!
//!     spawn_async(|_| {
//!         sleep(Duration::from_secs(3))?;
//!         println!("three ticks later");
//!         Ok(())
//!     })?
//!     .timeout(|err, _| { eprintln!("{}", err); Ok(()) }, Duration::from_secs(10))
//!     .defer(|_| { println!("cleanup"); Ok(()) });
//!
//!     runtime.run_until_idle(100);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Host tick loop                         │
//! │                Runtime::tick() / run_ticks()                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │   Timer   │      │ Dispatch  │      │   Sweep   │
//!    │ heartbeat │ ───▶ │   queue   │ ───▶ │ (timeouts)│
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                    Coroutines                           │
//!    │   own stacks, flags, handlers, deferred actions         │
//!    └─────────────────────────────────────────────────────────┘
//! ```

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use nix::unistd::{getpid, Pid};

// Re-export core types
pub use cotick_core::{
    CoError,
    CoResult,
    CoroutineId,
    CoroutineState,
    Event,
    EventName,
    Payload,
    Source,
    Clock,
    DiagnosticSink,
    MemoryError,
};
pub use cotick_core::constants;

// Re-export kprint macros for debug logging
pub use cotick_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use cotick_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use cotick_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use cotick_runtime::{
    ConfigError,
    Coroutine,
    CoroutineRegistry,
    Handler,
    KprintSink,
    ManualClock,
    MemorySink,
    MonotonicClock,
    RuntimeConfig,
    Scheduler,
    TimerService,
};

use cotick_runtime::tls;

/// Host-side driver for a scheduler
///
/// Creating a runtime installs its scheduler as this thread's default, so
/// the free functions [`spawn_async`] and [`sleep`] find it. The host calls
/// [`Runtime::tick`] once per tick interval.
pub struct Runtime {
    sched: Rc<Scheduler>,
    pid: Cell<Pid>,
}

impl Runtime {
    /// Runtime on the monotonic clock, configured from the environment
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(RuntimeConfig::from_env())
    }

    pub fn with_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::install(Scheduler::new(config)))
    }

    /// Runtime with an explicit clock and diagnostic sink
    pub fn with_parts(
        config: RuntimeConfig,
        clock: Rc<dyn Clock>,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::install(Scheduler::with_parts(config, clock, sink)))
    }

    fn install(sched: Rc<Scheduler>) -> Self {
        if sched.config().debug_logging {
            sched.config().print();
        }
        tls::install(&sched);
        Self {
            sched,
            pid: Cell::new(getpid()),
        }
    }

    /// One host tick
    ///
    /// In a forked child the inherited state is dropped first, so the child
    /// never touches its parent's coroutines.
    pub fn tick(&self) {
        self.detect_fork(getpid());
        self.sched.tick();
    }

    fn detect_fork(&self, pid: Pid) -> bool {
        if pid == self.pid.get() {
            return false;
        }
        kinfo!("fork detected ({} -> {}), resetting coroutine state", self.pid.get(), pid);
        self.pid.set(pid);
        self.sched.reset_on_fork();
        true
    }

    /// Run `n` ticks back to back
    pub fn run_ticks(&self, n: usize) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Tick every `tick_interval` until idle or `max_ticks` ran
    ///
    /// Returns true if the scheduler went idle.
    pub fn run_until_idle(&self, max_ticks: usize) -> bool {
        let interval = self.sched.config().tick_interval;
        for _ in 0..max_ticks {
            if self.is_idle() {
                return true;
            }
            std::thread::sleep(interval);
            self.tick();
        }
        self.is_idle()
    }

    /// Drop all coroutine, queue and timer state without running anything
    pub fn reset_on_fork(&self) {
        self.sched.reset_on_fork();
    }

    pub fn is_idle(&self) -> bool {
        self.sched.is_idle()
    }

    /// Create, set up and enqueue a coroutine for the next tick
    pub fn spawn_async<F>(&self, body: F) -> CoResult<Coroutine>
    where
        F: FnOnce(&Coroutine) -> CoResult<()> + 'static,
    {
        self.sched.spawn(body)
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.sched
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.sched.config()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        tls::uninstall(&self.sched);
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pid", &self.pid.get())
            .field("scheduler", &self.sched)
            .finish()
    }
}

/// Spawn a coroutine on the ambient scheduler
///
/// The ambient scheduler is the running coroutine's, else the thread's
/// installed [`Runtime`]. Fails with `Detached` when there is neither.
pub fn spawn_async<F>(body: F) -> CoResult<Coroutine>
where
    F: FnOnce(&Coroutine) -> CoResult<()> + 'static,
{
    tls::ambient_scheduler()
        .ok_or(CoError::Detached)?
        .spawn(body)
}

/// Suspend the current coroutine for `duration`
///
/// Outside any coroutine this blocks the thread and returns an empty payload.
pub fn sleep(duration: Duration) -> CoResult<Payload> {
    match tls::ambient_scheduler() {
        Some(sched) => sched.sleep(duration),
        None => {
            std::thread::sleep(duration);
            Ok(Payload::Empty)
        }
    }
}

/// The coroutine running on the caller's stack
#[inline]
pub fn current() -> Option<Coroutine> {
    tls::current_coroutine()
}

/// Check if currently executing within a coroutine
#[inline]
pub fn is_in_coroutine() -> bool {
    tls::depth() > 0
}

#[cfg(test)]
mod tests;
