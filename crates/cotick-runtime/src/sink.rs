//! Diagnostic sinks

use std::cell::RefCell;

use cotick_core::error::CoError;
use cotick_core::traits::DiagnosticSink;
use cotick_core::{kerror, kinfo};

/// Routes diagnostics to the kprint macros
#[derive(Debug, Default, Clone, Copy)]
pub struct KprintSink;

impl DiagnosticSink for KprintSink {
    fn info(&self, message: &str) {
        kinfo!("{}", message);
    }

    fn report(&self, error: &CoError) {
        kerror!("unhandled coroutine error: {}", error);
    }
}

/// Records diagnostics for later inspection
#[derive(Debug, Default)]
pub struct MemorySink {
    infos: RefCell<Vec<String>>,
    reports: RefCell<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Informational lines received so far
    pub fn infos(&self) -> Vec<String> {
        self.infos.borrow().clone()
    }

    /// Rendered error reports received so far
    pub fn reports(&self) -> Vec<String> {
        self.reports.borrow().clone()
    }

    pub fn report_count(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn clear(&self) {
        self.infos.borrow_mut().clear();
        self.reports.borrow_mut().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn info(&self, message: &str) {
        self.infos.borrow_mut().push(message.to_string());
    }

    fn report(&self, error: &CoError) {
        self.reports.borrow_mut().push(error.to_string());
    }
}
