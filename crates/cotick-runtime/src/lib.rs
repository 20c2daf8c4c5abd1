//! # cotick-runtime
//!
//! Platform-specific runtime for the cotick cooperative coroutine scheduler.
//!
//! This crate provides:
//! - Context switching (architecture-specific assembly)
//! - Coroutine stacks (mmap with guard pages)
//! - The `Coroutine` entity and its event/flag/defer machinery
//! - `CoroutineRegistry`: live table, dispatch queue, timeout sweep
//! - `TimerService`: sleeps and delayed event delivery
//! - `Scheduler`: the context one host tick drives
//!
//! Everything is single-threaded: handles are `Rc`-based and never leave the
//! thread that created them.

pub mod arch;
pub mod memory;
pub mod config;
pub mod clock;
pub mod sink;
pub mod tls;
mod continuation;
pub mod coroutine;
pub mod registry;
pub mod timer;
pub mod scheduler;

// Re-exports
pub use clock::{ManualClock, MonotonicClock};
pub use config::{ConfigError, RuntimeConfig};
pub use coroutine::{Coroutine, Handler};
pub use registry::CoroutineRegistry;
pub use scheduler::Scheduler;
pub use sink::{KprintSink, MemorySink};
pub use timer::TimerService;

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(not(unix))] {
        compile_error!("Unsupported platform");
    }
}
