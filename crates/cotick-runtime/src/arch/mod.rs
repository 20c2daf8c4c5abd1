//! Architecture-specific context switching
//!
//! Each backend exports the same surface:
//!
//! - `SavedRegs` - callee-saved register block for a suspended context
//! - `init_context` - prepare a fresh context that starts in an entry function
//! - `switch_context` - save the current context and jump to another

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use self::x86_64::{init_context, switch_context, SavedRegs};
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
        pub use self::aarch64::{init_context, switch_context, SavedRegs};
    } else {
        compile_error!("Unsupported architecture");
    }
}

/// Entry point a fresh context starts in. Receives the argument given to
/// `init_context` and must never return.
pub type EntryFn = extern "C" fn(usize) -> !;
