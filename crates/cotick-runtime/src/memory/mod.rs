//! Coroutine stack memory
//!
//! Platform-specific implementations map stacks with a guard page below the
//! usable region so an overflow faults instead of corrupting the heap.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("Unsupported platform");
    }
}
