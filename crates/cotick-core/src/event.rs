//! Event messages
//!
//! Every interaction with a suspended coroutine is an [`Event`]: suspension
//! requests, resumptions, timeouts, exceptions and end-of-life notices.

use core::fmt;
use std::any::Any;

use crate::error::CoError;
use crate::id::CoroutineId;

/// Name of an event
///
/// The built-in names are reserved by the runtime; anything else is a
/// user-defined name that can carry its own handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A timeout fault was converged into the coroutine
    Timeout,
    /// A non-timeout fault was converged into the coroutine
    Exception,
    /// True wake-up: `suspend()` returns the payload
    Resume,
    /// The coroutine destroyed itself while suspended
    End,
    /// The coroutine yielded control
    Suspend,
    /// Timer-internal sleep request
    Sleep,
    /// User-defined event
    Custom(String),
}

impl EventName {
    /// Wire name (stable across the runtime, used in logs)
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Timeout => "system.coroutine.timeout",
            EventName::Exception => "system.coroutine.exception",
            EventName::Resume => "system.coroutine.resume",
            EventName::End => "system.coroutine.end",
            EventName::Suspend => "system.coroutine.suspend",
            EventName::Sleep => "timer.sleep",
            EventName::Custom(name) => name,
        }
    }

    /// Check if this is one of the reserved names
    #[inline]
    pub fn is_builtin(&self) -> bool {
        !matches!(self, EventName::Custom(_))
    }
}

impl EventName {
    /// Builtin variant for a reserved wire name
    fn builtin(name: &str) -> Option<Self> {
        match name {
            "system.coroutine.timeout" => Some(EventName::Timeout),
            "system.coroutine.exception" => Some(EventName::Exception),
            "system.coroutine.resume" => Some(EventName::Resume),
            "system.coroutine.end" => Some(EventName::End),
            "system.coroutine.suspend" => Some(EventName::Suspend),
            "timer.sleep" => Some(EventName::Sleep),
            _ => None,
        }
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        EventName::builtin(name).unwrap_or_else(|| EventName::Custom(name.to_string()))
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        EventName::builtin(&name).unwrap_or(EventName::Custom(name))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// A coroutine (suspension, exception convergence, sleep requests)
    Coroutine(CoroutineId),
    /// The timer heartbeat
    Timer,
    /// Code outside any coroutine
    Host,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Coroutine(id) => write!(f, "{}", id),
            Source::Timer => f.write_str("timer"),
            Source::Host => f.write_str("host"),
        }
    }
}

/// Data carried by an event
pub enum Payload {
    /// No data
    Empty,
    /// An arbitrary value
    Value(Box<dyn Any>),
    /// A fault being converged or reported
    Fault(CoError),
}

impl Payload {
    /// Box an arbitrary value
    pub fn value<T: Any>(value: T) -> Self {
        Payload::Value(Box::new(value))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Borrow the value as `T`, if it is one
    pub fn get<T: Any>(&self) -> Option<&T> {
        match self {
            Payload::Value(v) => v.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Take the value out as `T`; hands the payload back on mismatch
    pub fn take<T: Any>(self) -> Result<T, Payload> {
        match self {
            Payload::Value(v) => v.downcast::<T>().map(|b| *b).map_err(Payload::Value),
            other => Err(other),
        }
    }

    /// Borrow the fault, if this payload carries one
    pub fn fault(&self) -> Option<&CoError> {
        match self {
            Payload::Fault(e) => Some(e),
            _ => None,
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Empty
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Value(_) => f.write_str("Value(..)"),
            Payload::Fault(e) => f.debug_tuple("Fault").field(e).finish(),
        }
    }
}

/// An immutable named message `{name, data, source}`
#[derive(Debug)]
pub struct Event {
    name: EventName,
    data: Payload,
    source: Source,
}

impl Event {
    pub fn new(name: impl Into<EventName>, data: Payload, source: Source) -> Self {
        Self {
            name: name.into(),
            data,
            source,
        }
    }

    /// A wake-up carrying `data` back to the suspended body
    pub fn resume(data: Payload, source: Source) -> Self {
        Self::new(EventName::Resume, data, source)
    }

    /// What a coroutine yields when it suspends
    pub fn suspend(id: CoroutineId) -> Self {
        Self::new(EventName::Suspend, Payload::Empty, Source::Coroutine(id))
    }

    /// What a coroutine yields when it destroyed itself while suspended
    pub fn end(id: CoroutineId) -> Self {
        Self::new(EventName::End, Payload::Empty, Source::Coroutine(id))
    }

    #[inline]
    pub fn name(&self) -> &EventName {
        &self.name
    }

    #[inline]
    pub fn data(&self) -> &Payload {
        &self.data
    }

    #[inline]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Consume the event, keeping only its payload
    #[inline]
    pub fn into_data(self) -> Payload {
        self.data
    }

    #[inline]
    pub fn is(&self, name: &EventName) -> bool {
        &self.name == name
    }
}

impl From<EventName> for Event {
    fn from(name: EventName) -> Self {
        Event::new(name, Payload::Empty, Source::Host)
    }
}
