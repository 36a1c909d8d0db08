//! `Subscription`: the handle an [`crate::observer::Observer`] receives from
//! `on_subscribe`, carrying the Reactive-Streams demand protocol spec.md
//! §4.2 specifies (`request(n)`/`cancel()`).
//!
//! Grounded on the same `contract.rs` cancellation idiom as
//! [`crate::disposable`], generalized with a [`crate::demand::Demand`]
//! counter. `Subscription::cancel` is `Disposable::cancel` (silent
//! teardown); `dispose()` is the external-force teardown spec.md §4.2/§7
//! describes, which additionally delivers `on_error(disposed)` to the
//! observer unless it has already reached a terminal event. The two are
//! distinct operations, not aliases of one another.

use crate::demand::Demand;
use crate::disposable::{Disposable, SimpleDisposable};
use crate::sealed::Sealed;
use std::rc::Rc;

pub trait Subscription: Disposable + Sealed {
    /// Requests up to `n` additional items be delivered. A no-op once the
    /// subscription is disposed.
    fn request(&self, n: u64);
}

/// A subscription over nothing: `empty()`/`never()`/`fail()` sources hand
/// this out since there is no upstream demand to track.
pub struct NoopSubscription {
    state: SimpleDisposable,
}

impl NoopSubscription {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            state: SimpleDisposable::new(),
        })
    }
}

impl Disposable for NoopSubscription {
    fn dispose(&self) {
        self.state.dispose();
    }
    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}

impl Subscription for NoopSubscription {
    fn request(&self, _n: u64) {}
}

/// The common subscription shape: a disposable flag plus an outstanding
/// demand counter, with a callback invoked on every successful `request`
/// so the owning operator can pull more items from upstream.
pub struct DemandSubscription<F: Fn(u64)> {
    state: SimpleDisposable,
    demand: Demand,
    on_request: F,
}

impl<F: Fn(u64) + 'static> DemandSubscription<F> {
    pub fn new(on_request: F) -> Rc<Self> {
        Rc::new(Self {
            state: SimpleDisposable::new(),
            demand: Demand::new(),
            on_request,
        })
    }

    pub fn demand(&self) -> &Demand {
        &self.demand
    }
}

impl<F: Fn(u64)> Disposable for DemandSubscription<F> {
    fn dispose(&self) {
        self.state.dispose();
    }
    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}

impl<F: Fn(u64) + 'static> Subscription for DemandSubscription<F> {
    fn request(&self, n: u64) {
        if self.is_disposed() || n == 0 {
            return;
        }
        self.demand.request(n);
        (self.on_request)(n);
    }
}
