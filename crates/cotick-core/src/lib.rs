//! # cotick-core
//!
//! Core types and traits for the cotick cooperative coroutine runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Context switching, stacks and scheduling live in `cotick-runtime`.
//!
//! ## Modules
//!
//! - `id` - Coroutine identifier type
//! - `event` - Event messages exchanged at suspension points
//! - `flags` - Reference-counted pending-concern flags
//! - `state` - Coroutine lifecycle state
//! - `error` - Error types
//! - `traits` - Clock and diagnostic sink interfaces
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod event;
pub mod flags;
pub mod state;
pub mod error;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::CoroutineId;
pub use event::{Event, EventName, Payload, Source};
pub use flags::FlagSet;
pub use state::CoroutineState;
pub use error::{CoError, CoResult, MemoryError};
pub use traits::{Clock, DiagnosticSink};
pub use env::{env_get, env_get_bool, env_get_opt};

/// Reserved flag and event names
pub mod constants {
    /// Held while the coroutine body is still running
    pub const FLAG_MAIN: &str = "system.coroutine.flag.main";

    /// Held while an exception is being converged into the handler table.
    /// Shares its name with the `exception` event, as the flag marks that dispatch.
    pub const FLAG_EXCEPTION: &str = "system.coroutine.exception";

    /// Minimum usable stack for a coroutine
    pub const MIN_STACK_SIZE: usize = 64 * 1024;
}
