//! `Action`: a unit of work posted to a [`crate::coordinator::Coordinator`].
//!
//! Grounded on `spark-core/src/runtime/executor.rs`'s boxed-closure task
//! model, combined with the `Disposable` state machine so an action can be
//! cancelled before it runs and can report whether it is still pending.

use crate::disposable::{Disposable, DisposableState, SimpleDisposable};
use std::cell::RefCell;
use std::rc::Rc;

/// A single `FnOnce` closure wrapped in the three-state disposable machinery
/// spec.md §3 describes for scheduled work: `scheduled -> invoked -> (dropped
/// or rescheduled)`, or `disposed` at any point before it runs.
pub struct Action {
    body: RefCell<Option<Box<dyn FnOnce()>>>,
    state: SimpleDisposable,
}

impl Action {
    pub fn new(body: impl FnOnce() + 'static) -> Rc<Self> {
        Rc::new(Self {
            body: RefCell::new(Some(Box::new(body))),
            state: SimpleDisposable::new(),
        })
    }

    /// Runs the body exactly once, provided the action wasn't disposed first.
    /// No-op if already invoked or disposed.
    pub fn run(&self) {
        if !self.state.mark_invoked() {
            return;
        }
        if let Some(body) = self.body.borrow_mut().take() {
            body();
        }
    }

    pub fn state(&self) -> DisposableState {
        self.state.state()
    }
}

impl Disposable for Action {
    fn dispose(&self) {
        self.state.dispose();
        // Drop the body without running it, releasing anything it captured.
        self.body.borrow_mut().take();
    }

    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}
