//! Seams between the runtime and its host
//!
//! Time and diagnostics are injected so schedulers can be driven by a
//! manual clock and observed through a recording sink in tests.

use core::time::Duration;

use crate::error::CoError;

/// Monotonic time source
///
/// `now()` is measured from an arbitrary fixed origin and never goes
/// backwards.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Where the runtime sends diagnostics
///
/// `report` receives faults that found no handler (or escaped every
/// handler); `info` receives informational notices such as the sweep's
/// zero-flag warning.
pub trait DiagnosticSink {
    fn info(&self, message: &str);
    fn report(&self, error: &CoError);
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for std::rc::Rc<S> {
    fn info(&self, message: &str) {
        (**self).info(message)
    }

    fn report(&self, error: &CoError) {
        (**self).report(error)
    }
}
