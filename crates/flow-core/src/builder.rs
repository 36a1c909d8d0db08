//! `ObservableBuilder`: the single entry point spec.md §4.6/§6.2 names for
//! constructing sources, so call sites read `Observable::just(..)` rather
//! than reaching into `crate::source` directly.

use crate::coordinator::Coordinator;
use crate::error::SharedFlowError;
use crate::observable::{Obs, Observable};
use std::rc::Rc;
use std::time::Duration;

pub struct ObservableBuilder;

impl ObservableBuilder {
    pub fn empty<T: 'static>() -> Obs<T> {
        crate::source::empty()
    }

    pub fn never<T: 'static>() -> Obs<T> {
        crate::source::never()
    }

    pub fn fail<T: 'static>(error: SharedFlowError) -> Obs<T> {
        crate::source::fail(error)
    }

    pub fn just<T: Clone + 'static>(items: Vec<T>) -> Obs<T> {
        crate::source::just(items)
    }

    pub fn repeat<T: Clone + 'static>(value: T) -> Obs<T> {
        crate::source::repeat(value)
    }

    pub fn iota(start: i64) -> Obs<i64> {
        crate::source::iota(start)
    }

    pub fn range(start: i64, count: usize) -> Obs<i64> {
        crate::source::range(start, count)
    }

    pub fn from_container<T: Clone + 'static>(items: impl IntoIterator<Item = T>) -> Obs<T> {
        crate::source::from_container(items)
    }

    pub fn from_callable<T: 'static>(f: impl Fn() -> T + 'static) -> Obs<T> {
        crate::source::from_callable(f)
    }

    pub fn from_generator<T: 'static>(generator: impl FnMut() -> Option<T> + 'static) -> Obs<T> {
        crate::source::from_generator(generator)
    }

    pub fn from_resource<T: 'static>(
        coordinator: Rc<Coordinator>,
        resource: Rc<crate::async_bridge::AsyncResource<T>>,
    ) -> Obs<T> {
        crate::source::from_resource(coordinator, resource)
    }

    pub fn defer<T: 'static>(factory: impl Fn() -> Obs<T> + 'static) -> Obs<T> {
        crate::source::defer(factory)
    }

    pub fn interval(coordinator: Rc<Coordinator>, period: Duration) -> Obs<u64> {
        crate::source::interval(coordinator, period)
    }
}

/// `observe_on`: re-posts each upstream event through `coordinator` before
/// forwarding it, so a producer on one coordinator can feed a consumer
/// pinned to another without either blocking the other. Matches spec.md
/// §6.2's `observe_on`/`to_resource` pair — `to_resource` is the same idea
/// running the other direction, implemented directly by
/// [`crate::async_bridge::channel`] plus [`ObservableBuilder::from_resource`].
pub fn observe_on<T: 'static>(upstream: Obs<T>, coordinator: Rc<Coordinator>) -> Obs<T> {
    struct ObserveOnObservable<T> {
        upstream: Obs<T>,
        coordinator: Rc<Coordinator>,
    }
    struct ObserveOnObserver<T> {
        downstream: Rc<dyn crate::observer::Observer<T>>,
        coordinator: Rc<Coordinator>,
    }
    impl<T: 'static> crate::observer::Observer<T> for ObserveOnObserver<T> {
        fn on_subscribe(&self, subscription: Rc<dyn crate::subscription::Subscription>) {
            self.downstream.on_subscribe(subscription);
        }
        fn on_next(&self, item: T) {
            let downstream = self.downstream.clone();
            self.coordinator.post(move || downstream.on_next(item));
        }
        fn on_error(&self, error: SharedFlowError) {
            let downstream = self.downstream.clone();
            self.coordinator.post(move || downstream.on_error(error));
        }
        fn on_complete(&self) {
            let downstream = self.downstream.clone();
            self.coordinator.post(move || downstream.on_complete());
        }
    }
    impl<T: 'static> crate::observable::Observable<T> for ObserveOnObservable<T> {
        fn subscribe(&self, observer: Rc<dyn crate::observer::Observer<T>>) {
            self.coordinator.observability().debug("observe_on", "subscribed, re-posting events through target coordinator");
            self.upstream.subscribe(Rc::new(ObserveOnObserver {
                downstream: observer,
                coordinator: self.coordinator.clone(),
            }));
        }
    }
    Rc::new(ObserveOnObservable { upstream, coordinator })
}
