//! Thread-local runtime context
//!
//! Tracks which coroutine is executing on this thread (a stack, since a
//! coroutine may resume another) and which scheduler the free functions
//! fall back to outside any coroutine.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use cotick_core::id::CoroutineId;
use cotick_core::kprint;

use crate::coroutine::Coroutine;
use crate::scheduler::Scheduler;

thread_local! {
    /// Coroutines currently switched in, innermost last
    static RUNNING: RefCell<Vec<Coroutine>> = const { RefCell::new(Vec::new()) };

    /// Scheduler installed as this thread's default
    static INSTALLED: RefCell<Weak<Scheduler>> = const { RefCell::new(Weak::new()) };
}

/// Mark `co` as running (innermost) on this thread
#[inline]
pub(crate) fn push_running(co: &Coroutine) {
    RUNNING.with(|r| r.borrow_mut().push(co.clone()));
    kprint::set_coroutine_id(co.id().as_u64());
}

/// Pop the innermost running coroutine
#[inline]
pub(crate) fn pop_running() -> Option<Coroutine> {
    let popped = RUNNING.with(|r| r.borrow_mut().pop());
    match current_id() {
        Some(id) => kprint::set_coroutine_id(id.as_u64()),
        None => kprint::clear_coroutine_id(),
    }
    popped
}

/// The innermost running coroutine, if any
#[inline]
pub fn current_coroutine() -> Option<Coroutine> {
    RUNNING.with(|r| r.borrow().last().cloned())
}

#[inline]
pub fn current_id() -> Option<CoroutineId> {
    RUNNING.with(|r| r.borrow().last().map(Coroutine::id))
}

/// Check if `id` is the innermost running coroutine
#[inline]
pub fn is_running(id: CoroutineId) -> bool {
    current_id() == Some(id)
}

/// Number of nested running coroutines
#[inline]
pub fn depth() -> usize {
    RUNNING.with(|r| r.borrow().len())
}

/// Install `sched` as this thread's default scheduler
pub fn install(sched: &Rc<Scheduler>) {
    INSTALLED.with(|i| *i.borrow_mut() = Rc::downgrade(sched));
}

/// Remove the default scheduler if it is `sched`
pub fn uninstall(sched: &Rc<Scheduler>) {
    INSTALLED.with(|i| {
        let mut slot = i.borrow_mut();
        if slot.ptr_eq(&Rc::downgrade(sched)) {
            *slot = Weak::new();
        }
    });
}

/// The installed default scheduler, if still alive
pub fn installed() -> Option<Rc<Scheduler>> {
    INSTALLED.with(|i| i.borrow().upgrade())
}

/// Scheduler for free-function calls: the running coroutine's, else the
/// installed default
pub fn ambient_scheduler() -> Option<Rc<Scheduler>> {
    current_coroutine()
        .and_then(|co| co.scheduler())
        .or_else(installed)
}
