//! `for_each`: the terminal sink operator, spec.md §4.4.6.
//!
//! Grounded on the observer-closures pattern already used by
//! [`crate::observer::ClosureObserver`]; `for_each` additionally drives its
//! own demand, requesting `FlowConfig::for_each_default_request` items at a
//! time and re-requesting once consumed, rather than requesting unbounded
//! demand up front.

use crate::coordinator::Coordinator;
use crate::error::SharedFlowError;
use crate::observable::{Obs, Observable};
use crate::observer::Observer;
use crate::subscription::Subscription;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct ForEachObserver<N, E, C> {
    on_next: RefCell<N>,
    on_error: RefCell<Option<E>>,
    on_complete: RefCell<Option<C>>,
    subscription: RefCell<Option<Rc<dyn Subscription>>>,
    coordinator: Rc<Coordinator>,
    batch_size: u64,
    delivered_since_request: Cell<u64>,
}

impl<T, N, E, C> Observer<T> for ForEachObserver<N, E, C>
where
    N: FnMut(T) + 'static,
    E: FnOnce(SharedFlowError) + 'static,
    C: FnOnce() + 'static,
{
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.coordinator.observability().debug("for_each", "subscribed");
        subscription.request(self.batch_size);
        *self.subscription.borrow_mut() = Some(subscription);
    }

    fn on_next(&self, item: T) {
        (self.on_next.borrow_mut())(item);
        let delivered = self.delivered_since_request.get() + 1;
        if delivered >= self.batch_size {
            self.delivered_since_request.set(0);
            if let Some(subscription) = self.subscription.borrow().as_ref() {
                self.coordinator.observability().trace("for_each", "batch consumed, re-requesting");
                subscription.request(self.batch_size);
            }
        } else {
            self.delivered_since_request.set(delivered);
        }
    }

    fn on_error(&self, error: SharedFlowError) {
        self.coordinator.observability().debug("for_each", "terminated by on_error");
        if let Some(f) = self.on_error.borrow_mut().take() {
            f(error);
        }
    }

    fn on_complete(&self) {
        self.coordinator.observability().debug("for_each", "terminated by on_complete");
        if let Some(f) = self.on_complete.borrow_mut().take() {
            f();
        }
    }
}

/// Subscribes to `source`, requesting items `batch_size` (per
/// [`crate::config::FlowConfig::for_each_default_request`]) at a time and
/// invoking the supplied closures for each event. Returns the underlying
/// subscription so the caller can cancel early.
pub fn for_each<T: 'static>(
    source: Obs<T>,
    coordinator: Rc<Coordinator>,
    on_next: impl FnMut(T) + 'static,
    on_error: impl FnOnce(SharedFlowError) + 'static,
    on_complete: impl FnOnce() + 'static,
) -> Rc<dyn Subscription> {
    for_each_with_batch(
        source,
        coordinator,
        crate::config::FlowConfig::default().for_each_default_request as u64,
        on_next,
        on_error,
        on_complete,
    )
}

pub fn for_each_with_batch<T: 'static>(
    source: Obs<T>,
    coordinator: Rc<Coordinator>,
    batch_size: u64,
    on_next: impl FnMut(T) + 'static,
    on_error: impl FnOnce(SharedFlowError) + 'static,
    on_complete: impl FnOnce() + 'static,
) -> Rc<dyn Subscription> {
    let observer = Rc::new(ForEachObserver {
        on_next: RefCell::new(on_next),
        on_error: RefCell::new(Some(on_error)),
        on_complete: RefCell::new(Some(on_complete)),
        subscription: RefCell::new(None),
        coordinator: coordinator.clone(),
        batch_size: batch_size.max(1),
        delivered_since_request: Cell::new(0),
    });
    coordinator.add_child(observer.subscription_as_disposable());
    source.subscribe(observer.clone());
    observer
        .subscription
        .borrow()
        .clone()
        .unwrap_or_else(|| crate::subscription::NoopSubscription::new())
}

impl<N, E, C> ForEachObserver<N, E, C> {
    fn subscription_as_disposable(self: &Rc<Self>) -> Rc<dyn crate::disposable::Disposable> {
        struct Proxy<N, E, C> {
            observer: Rc<ForEachObserver<N, E, C>>,
        }
        impl<N, E, C> crate::disposable::Disposable for Proxy<N, E, C> {
            fn dispose(&self) {
                if let Some(sub) = self.observer.subscription.borrow().as_ref() {
                    sub.dispose();
                }
            }
            fn is_disposed(&self) -> bool {
                self.observer
                    .subscription
                    .borrow()
                    .as_ref()
                    .map(|s| s.is_disposed())
                    .unwrap_or(true)
            }
        }
        Rc::new(Proxy { observer: self.clone() })
    }
}
