//! `Observer`: the consumer side of the Reactive-Streams-style protocol
//! spec.md §4.2 defines — `on_subscribe` exactly once, then any number of
//! `on_next`, terminated by exactly one of `on_error`/`on_complete`.
//!
//! Grounded on `spark-core/src/pipeline/traits/generic.rs`'s
//! producer/consumer trait pair, adapted to the single-item-type streams
//! this crate deals in (no codec framing).

use crate::error::SharedFlowError;
use crate::subscription::Subscription;
use std::rc::Rc;

/// A terminal or data event, used where operators need to buffer or replay
/// a sequence of observer calls (`cache`, `replay`, `cell`) rather than
/// forward them live.
#[derive(Clone)]
pub enum Event<T> {
    Next(T),
    Error(SharedFlowError),
    Complete,
}

pub trait Observer<T> {
    /// Called exactly once, before any `on_next`. Implementations that want
    /// to pull items must call `request(n)` on the given subscription; a
    /// subscription with no `request` call ever made receives no items.
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>);

    fn on_next(&self, item: T);

    /// Terminal, mutually exclusive with `on_complete`. No further calls of
    /// any kind follow.
    fn on_error(&self, error: SharedFlowError);

    /// Terminal, mutually exclusive with `on_error`. No further calls of
    /// any kind follow.
    fn on_complete(&self);
}

impl<T> Observer<T> for Rc<dyn Observer<T>> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        (**self).on_subscribe(subscription)
    }
    fn on_next(&self, item: T) {
        (**self).on_next(item)
    }
    fn on_error(&self, error: SharedFlowError) {
        (**self).on_error(error)
    }
    fn on_complete(&self) {
        (**self).on_complete()
    }
}

/// An observer built from plain closures, for sinks and tests that don't
/// need a dedicated type. Mirrors the "functional sink" shape used by
/// `for_each`/`do_on_next` internally.
pub struct ClosureObserver<N, E, C> {
    on_next: std::cell::RefCell<N>,
    on_error: std::cell::RefCell<Option<E>>,
    on_complete: std::cell::RefCell<Option<C>>,
    subscription: std::cell::RefCell<Option<Rc<dyn Subscription>>>,
}

impl<T, N, E, C> ClosureObserver<N, E, C>
where
    N: FnMut(T) + 'static,
    E: FnOnce(SharedFlowError) + 'static,
    C: FnOnce() + 'static,
{
    pub fn new(on_next: N, on_error: E, on_complete: C) -> Rc<Self> {
        Rc::new(Self {
            on_next: std::cell::RefCell::new(on_next),
            on_error: std::cell::RefCell::new(Some(on_error)),
            on_complete: std::cell::RefCell::new(Some(on_complete)),
            subscription: std::cell::RefCell::new(None),
        })
    }

    pub fn subscription(&self) -> Option<Rc<dyn Subscription>> {
        self.subscription.borrow().clone()
    }
}

impl<T, N, E, C> Observer<T> for ClosureObserver<N, E, C>
where
    N: FnMut(T) + 'static,
    E: FnOnce(SharedFlowError) + 'static,
    C: FnOnce() + 'static,
{
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn on_next(&self, item: T) {
        (self.on_next.borrow_mut())(item);
    }

    fn on_error(&self, error: SharedFlowError) {
        if let Some(f) = self.on_error.borrow_mut().take() {
            f(error);
        }
    }

    fn on_complete(&self) {
        if let Some(f) = self.on_complete.borrow_mut().take() {
            f();
        }
    }
}
