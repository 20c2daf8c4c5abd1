//! Coroutine lifecycle state

use core::fmt;

/// Observable state of a coroutine's continuation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoroutineState {
    /// Created, `setup` not called yet
    Created = 0,

    /// Set up and registered, body not started
    Ready = 1,

    /// Currently executing on some stack in this thread
    Running = 2,

    /// Parked at a suspension point
    Suspended = 3,

    /// Continuation ran to completion and cannot be resumed
    Finished = 4,
}

impl CoroutineState {
    /// Check if the continuation may be started or resumed from here
    #[inline]
    pub const fn is_resumable(&self) -> bool {
        matches!(self, CoroutineState::Ready | CoroutineState::Suspended)
    }

    /// Check if the continuation has terminated
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, CoroutineState::Finished)
    }
}

impl From<u8> for CoroutineState {
    fn from(v: u8) -> Self {
        match v {
            1 => CoroutineState::Ready,
            2 => CoroutineState::Running,
            3 => CoroutineState::Suspended,
            4 => CoroutineState::Finished,
            _ => CoroutineState::Created,
        }
    }
}

impl fmt::Display for CoroutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoroutineState::Created => write!(f, "CREATED"),
            CoroutineState::Ready => write!(f, "READY"),
            CoroutineState::Running => write!(f, "RUNNING"),
            CoroutineState::Suspended => write!(f, "SUSPENDED"),
            CoroutineState::Finished => write!(f, "FINISHED"),
        }
    }
}
