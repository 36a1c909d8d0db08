//! Single-input, single-output transforming operators: `map`, `filter`,
//! `take`, `take_while`, `distinct`, the `do_on_*` peek operators,
//! `on_error_complete`, and `reduce` — spec.md §4.3.
//!
//! Grounded on `spark-core/src/pipeline/traits/generic.rs`'s stage-chaining
//! style: each operator is a small `Observable<U>` that wraps an upstream
//! `Obs<T>` and re-wraps whatever `Observer<U>` subscribes to it in an
//! adapter observer that forwards transformed events upstream-to-downstream.

use crate::error::SharedFlowError;
use crate::observable::{Obs, Observable};
use crate::observer::Observer;
use crate::subscription::Subscription;
use std::cell::RefCell;
use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

struct MapObservable<T, U, F> {
    upstream: Obs<T>,
    f: Rc<F>,
}

struct MapObserver<U, F> {
    downstream: Rc<dyn Observer<U>>,
    f: Rc<F>,
}

impl<T, U: 'static, F: Fn(T) -> U + 'static> Observer<T> for MapObserver<U, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        self.downstream.on_next((self.f)(item));
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

impl<T: 'static, U: 'static, F: Fn(T) -> U + 'static> Observable<U> for MapObservable<T, U, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<U>>) {
        self.upstream.subscribe(Rc::new(MapObserver {
            downstream: observer,
            f: self.f.clone(),
        }));
    }
}

pub fn map<T: 'static, U: 'static>(upstream: Obs<T>, f: impl Fn(T) -> U + 'static) -> Obs<U> {
    Rc::new(MapObservable {
        upstream,
        f: Rc::new(f),
    })
}

struct FilterObservable<T, F> {
    upstream: Obs<T>,
    predicate: Rc<F>,
}

struct FilterObserver<T, F> {
    downstream: Rc<dyn Observer<T>>,
    predicate: Rc<F>,
}

impl<T: 'static, F: Fn(&T) -> bool + 'static> Observer<T> for FilterObserver<T, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        if (self.predicate)(&item) {
            self.downstream.on_next(item);
        }
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

impl<T: 'static, F: Fn(&T) -> bool + 'static> Observable<T> for FilterObservable<T, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(FilterObserver {
            downstream: observer,
            predicate: self.predicate.clone(),
        }));
    }
}

pub fn filter<T: 'static>(upstream: Obs<T>, predicate: impl Fn(&T) -> bool + 'static) -> Obs<T> {
    Rc::new(FilterObservable {
        upstream,
        predicate: Rc::new(predicate),
    })
}

/// A subscription decorator that caps how much demand is forwarded upstream
/// and disposes the upstream subscription once `limit` items have been
/// delivered, matching spec.md §4.3's `take(n)` early-completion rule.
struct TakeSubscription {
    upstream: Rc<dyn Subscription>,
    remaining: RefCell<u64>,
}

impl crate::disposable::Disposable for TakeSubscription {
    fn dispose(&self) {
        self.upstream.dispose();
    }
    fn cancel(&self) {
        self.upstream.cancel();
    }
    fn is_disposed(&self) -> bool {
        self.upstream.is_disposed()
    }
}

impl crate::sealed::Sealed for TakeSubscription {}

impl Subscription for TakeSubscription {
    fn request(&self, n: u64) {
        let capped = (*self.remaining.borrow()).min(n);
        self.upstream.request(capped);
    }
}

struct TakeObservable<T> {
    upstream: Obs<T>,
    count: u64,
}

struct TakeObserver<T> {
    downstream: Rc<dyn Observer<T>>,
    remaining: Rc<RefCell<u64>>,
    upstream_sub: RefCell<Option<Rc<dyn Subscription>>>,
}

impl<T: 'static> Observer<T> for TakeObserver<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        *self.upstream_sub.borrow_mut() = Some(subscription.clone());
        if *self.remaining.borrow() == 0 {
            subscription.cancel();
            self.downstream.on_complete();
            return;
        }
        self.downstream.on_subscribe(Rc::new(TakeSubscription {
            upstream: subscription,
            remaining: RefCell::new(*self.remaining.borrow()),
        }));
    }
    fn on_next(&self, item: T) {
        let mut remaining = self.remaining.borrow_mut();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        let exhausted = *remaining == 0;
        drop(remaining);
        self.downstream.on_next(item);
        if exhausted {
            if let Some(sub) = self.upstream_sub.borrow().as_ref() {
                sub.cancel();
            }
            self.downstream.on_complete();
        }
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

impl<T: 'static> Observable<T> for TakeObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(TakeObserver {
            downstream: observer,
            remaining: Rc::new(RefCell::new(self.count)),
            upstream_sub: RefCell::new(None),
        }));
    }
}

pub fn take<T: 'static>(upstream: Obs<T>, count: u64) -> Obs<T> {
    Rc::new(TakeObservable { upstream, count })
}

struct TakeWhileObserver<T, F> {
    downstream: Rc<dyn Observer<T>>,
    predicate: Rc<F>,
    upstream_sub: RefCell<Option<Rc<dyn Subscription>>>,
}

impl<T: 'static, F: Fn(&T) -> bool + 'static> Observer<T> for TakeWhileObserver<T, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        *self.upstream_sub.borrow_mut() = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        if (self.predicate)(&item) {
            self.downstream.on_next(item);
        } else {
            if let Some(sub) = self.upstream_sub.borrow().as_ref() {
                sub.cancel();
            }
            self.downstream.on_complete();
        }
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

struct TakeWhileObservable<T, F> {
    upstream: Obs<T>,
    predicate: Rc<F>,
}

impl<T: 'static, F: Fn(&T) -> bool + 'static> Observable<T> for TakeWhileObservable<T, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(TakeWhileObserver {
            downstream: observer,
            predicate: self.predicate.clone(),
            upstream_sub: RefCell::new(None),
        }));
    }
}

pub fn take_while<T: 'static>(upstream: Obs<T>, predicate: impl Fn(&T) -> bool + 'static) -> Obs<T> {
    Rc::new(TakeWhileObservable {
        upstream,
        predicate: Rc::new(predicate),
    })
}

struct DistinctObserver<T> {
    downstream: Rc<dyn Observer<T>>,
    seen: RefCell<HashSet<T>>,
}

impl<T: 'static + Eq + Hash + Clone> Observer<T> for DistinctObserver<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        if self.seen.borrow_mut().insert(item.clone()) {
            self.downstream.on_next(item);
        }
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}

struct DistinctObservable<T> {
    upstream: Obs<T>,
}

impl<T: 'static + Eq + Hash + Clone> Observable<T> for DistinctObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(DistinctObserver {
            downstream: observer,
            seen: RefCell::new(HashSet::new()),
        }));
    }
}

pub fn distinct<T: 'static + Eq + Hash + Clone>(upstream: Obs<T>) -> Obs<T> {
    Rc::new(DistinctObservable { upstream })
}

struct DoOnNextObserver<T, F> {
    downstream: Rc<dyn Observer<T>>,
    hook: Rc<F>,
}
struct DoOnNextObservable<T, F> {
    upstream: Obs<T>,
    hook: Rc<F>,
}
impl<T: 'static, F: Fn(&T) + 'static> Observer<T> for DoOnNextObserver<T, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        (self.hook)(&item);
        self.downstream.on_next(item);
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}
impl<T: 'static, F: Fn(&T) + 'static> Observable<T> for DoOnNextObservable<T, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(DoOnNextObserver {
            downstream: observer,
            hook: self.hook.clone(),
        }));
    }
}
pub fn do_on_next<T: 'static>(upstream: Obs<T>, hook: impl Fn(&T) + 'static) -> Obs<T> {
    Rc::new(DoOnNextObservable {
        upstream,
        hook: Rc::new(hook),
    })
}

struct DoOnErrorObserver<T, F> {
    downstream: Rc<dyn Observer<T>>,
    hook: Rc<F>,
}
struct DoOnErrorObservable<T, F> {
    upstream: Obs<T>,
    hook: Rc<F>,
}
impl<T: 'static, F: Fn(&SharedFlowError) + 'static> Observer<T> for DoOnErrorObserver<T, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        self.downstream.on_next(item);
    }
    fn on_error(&self, error: SharedFlowError) {
        (self.hook)(&error);
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}
impl<T: 'static, F: Fn(&SharedFlowError) + 'static> Observable<T> for DoOnErrorObservable<T, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(DoOnErrorObserver {
            downstream: observer,
            hook: self.hook.clone(),
        }));
    }
}
pub fn do_on_error<T: 'static>(upstream: Obs<T>, hook: impl Fn(&SharedFlowError) + 'static) -> Obs<T> {
    Rc::new(DoOnErrorObservable {
        upstream,
        hook: Rc::new(hook),
    })
}

struct DoOnCompleteObserver<T, F> {
    downstream: Rc<dyn Observer<T>>,
    hook: Rc<F>,
}
struct DoOnCompleteObservable<T, F> {
    upstream: Obs<T>,
    hook: Rc<F>,
}
impl<T: 'static, F: Fn() + 'static> Observer<T> for DoOnCompleteObserver<T, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        self.downstream.on_next(item);
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        (self.hook)();
        self.downstream.on_complete();
    }
}
impl<T: 'static, F: Fn() + 'static> Observable<T> for DoOnCompleteObservable<T, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(DoOnCompleteObserver {
            downstream: observer,
            hook: self.hook.clone(),
        }));
    }
}
pub fn do_on_complete<T: 'static>(upstream: Obs<T>, hook: impl Fn() + 'static) -> Obs<T> {
    Rc::new(DoOnCompleteObservable {
        upstream,
        hook: Rc::new(hook),
    })
}

struct DoFinallyObserver<T, F: Fn() + 'static> {
    downstream: Rc<dyn Observer<T>>,
    hook: Rc<F>,
    fired: RefCell<bool>,
}
impl<T, F: Fn() + 'static> DoFinallyObserver<T, F> {
    fn fire_once(&self) {
        if !self.fired.replace(true) {
            (self.hook)();
        }
    }
}
struct DoFinallyObservable<T, F> {
    upstream: Obs<T>,
    hook: Rc<F>,
}
impl<T: 'static, F: Fn() + 'static> Observer<T> for DoFinallyObserver<T, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        self.downstream.on_next(item);
    }
    fn on_error(&self, error: SharedFlowError) {
        self.fire_once();
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        self.fire_once();
        self.downstream.on_complete();
    }
}
impl<T: 'static, F: Fn() + 'static> Observable<T> for DoFinallyObservable<T, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(DoFinallyObserver {
            downstream: observer,
            hook: self.hook.clone(),
            fired: RefCell::new(false),
        }));
    }
}
pub fn do_finally<T: 'static>(upstream: Obs<T>, hook: impl Fn() + 'static) -> Obs<T> {
    Rc::new(DoFinallyObservable {
        upstream,
        hook: Rc::new(hook),
    })
}

struct OnErrorCompleteObserver<T> {
    downstream: Rc<dyn Observer<T>>,
}
impl<T: 'static> Observer<T> for OnErrorCompleteObserver<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        self.downstream.on_next(item);
    }
    fn on_error(&self, _error: SharedFlowError) {
        self.downstream.on_complete();
    }
    fn on_complete(&self) {
        self.downstream.on_complete();
    }
}
struct OnErrorCompleteObservable<T> {
    upstream: Obs<T>,
}
impl<T: 'static> Observable<T> for OnErrorCompleteObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        self.upstream.subscribe(Rc::new(OnErrorCompleteObserver { downstream: observer }));
    }
}
pub fn on_error_complete<T: 'static>(upstream: Obs<T>) -> Obs<T> {
    Rc::new(OnErrorCompleteObservable { upstream })
}

/// Folds the whole stream into a single value emitted on completion,
/// matching spec.md §4.3's `reduce(seed, f)`: no intermediate values are
/// emitted, only the final accumulator, delivered as one `on_next` followed
/// by `on_complete`.
struct ReduceObserver<T, U, F> {
    downstream: Rc<dyn Observer<U>>,
    state: RefCell<Option<U>>,
    f: Rc<F>,
    _marker: std::marker::PhantomData<T>,
}
impl<T: 'static, U: 'static + Clone, F: Fn(U, T) -> U + 'static> Observer<T> for ReduceObserver<T, U, F> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        subscription.request(crate::demand::UNBOUNDED);
        self.downstream.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        let current = self.state.borrow_mut().take().expect("seeded before first on_next");
        *self.state.borrow_mut() = Some((self.f)(current, item));
    }
    fn on_error(&self, error: SharedFlowError) {
        self.downstream.on_error(error);
    }
    fn on_complete(&self) {
        if let Some(result) = self.state.borrow_mut().take() {
            self.downstream.on_next(result);
        }
        self.downstream.on_complete();
    }
}
struct ReduceObservable<T, U, F> {
    upstream: Obs<T>,
    seed: U,
    f: Rc<F>,
}
impl<T: 'static, U: 'static + Clone, F: Fn(U, T) -> U + 'static> Observable<U> for ReduceObservable<T, U, F> {
    fn subscribe(&self, observer: Rc<dyn Observer<U>>) {
        self.upstream.subscribe(Rc::new(ReduceObserver {
            downstream: observer,
            state: RefCell::new(Some(self.seed.clone())),
            f: self.f.clone(),
            _marker: std::marker::PhantomData,
        }));
    }
}

pub fn reduce<T: 'static, U: 'static + Clone>(upstream: Obs<T>, seed: U, f: impl Fn(U, T) -> U + 'static) -> Obs<U> {
    Rc::new(ReduceObservable {
        upstream,
        seed,
        f: Rc::new(f),
    })
}
