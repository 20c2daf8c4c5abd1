//! Error types for the coroutine runtime

use core::fmt;
use std::any::Any;

/// Result type for coroutine operations
pub type CoResult<T> = Result<T, CoError>;

/// Errors (the runtime's "exceptions") that can occur in or around a coroutine
#[derive(Debug)]
pub enum CoError {
    /// Operation invoked before `setup` created the continuation
    NotSetup,

    /// `setup` called twice
    AlreadySetup,

    /// Continuation is not in a state that allows the operation
    /// (resuming a running, fresh or finished continuation)
    InvalidState(&'static str),

    /// Injected by the sweep when a coroutine outlives its deadline
    TimeoutExceeded,

    /// Internal invariant breach at a suspension point
    ProtocolViolation(&'static str),

    /// A panic was caught inside a body, deferred action or handler
    Panicked(String),

    /// Raised by user code
    Raised(Box<dyn std::error::Error>),

    /// Stack memory could not be mapped
    Memory(MemoryError),

    /// The owning scheduler no longer exists
    Detached,
}

impl CoError {
    /// Wrap a user error
    pub fn raise<E: std::error::Error + 'static>(error: E) -> Self {
        CoError::Raised(Box::new(error))
    }

    /// User error from a plain message
    pub fn msg(message: impl Into<String>) -> Self {
        CoError::Raised(message.into().into())
    }

    /// Convert a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CoError::Panicked(message)
    }

    /// Timeout-kind faults converge to the `timeout` event, everything else
    /// to `exception`
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoError::TimeoutExceeded)
    }
}

impl fmt::Display for CoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoError::NotSetup => write!(f, "coroutine not setup"),
            CoError::AlreadySetup => write!(f, "coroutine already setup"),
            CoError::InvalidState(what) => write!(f, "invalid coroutine state: {}", what),
            CoError::TimeoutExceeded => write!(f, "the run time exceeds the maximum limit"),
            CoError::ProtocolViolation(what) => write!(f, "protocol violation: {}", what),
            CoError::Panicked(msg) => write!(f, "coroutine panicked: {}", msg),
            CoError::Raised(e) => write!(f, "{}", e),
            CoError::Memory(e) => write!(f, "memory error: {}", e),
            CoError::Detached => write!(f, "scheduler no longer exists"),
        }
    }
}

impl std::error::Error for CoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoError::Raised(e) => Some(e.as_ref()),
            CoError::Memory(e) => Some(e),
            _ => None,
        }
    }
}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect failed
    ProtectionFailed,

    /// Requested stack size overflows the address computation
    TooLarge,

    /// Requested stack is below the usable minimum
    TooSmall,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "stack protection change failed"),
            MemoryError::TooLarge => write!(f, "requested stack is too large"),
            MemoryError::TooSmall => write!(f, "requested stack is too small"),
        }
    }
}

impl std::error::Error for MemoryError {}

impl From<MemoryError> for CoError {
    fn from(e: MemoryError) -> Self {
        CoError::Memory(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = CoError::NotSetup;
        assert_eq!(format!("{}", e), "coroutine not setup");

        let e = CoError::Memory(MemoryError::AllocationFailed);
        assert_eq!(format!("{}", e), "memory error: stack allocation failed");

        let e = CoError::msg("boom");
        assert_eq!(e.to_string(), "boom");
    }

    #[test]
    fn test_error_conversion() {
        let err: CoError = MemoryError::ProtectionFailed.into();
        assert!(matches!(err, CoError::Memory(MemoryError::ProtectionFailed)));
    }

    #[test]
    fn test_timeout_classification() {
        assert!(CoError::TimeoutExceeded.is_timeout());
        assert!(!CoError::msg("x").is_timeout());
        assert!(!CoError::Panicked("x".into()).is_timeout());
    }

    #[test]
    fn test_from_panic_payloads() {
        let e = CoError::from_panic(Box::new("static"));
        assert!(matches!(e, CoError::Panicked(ref m) if m == "static"));

        let e = CoError::from_panic(Box::new(String::from("owned")));
        assert!(matches!(e, CoError::Panicked(ref m) if m == "owned"));

        let e = CoError::from_panic(Box::new(5u8));
        assert!(matches!(e, CoError::Panicked(_)));
    }
}
