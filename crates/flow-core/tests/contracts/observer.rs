//! Universal observer invariants that don't fit neatly into the
//! subscription-protocol tests: exactly-once `on_subscribe` across an
//! operator that resubscribes its upstream multiple times, and
//! at-most-one terminal call. These are regression tests for the
//! `retry`/`on_error_resume_next` proxy-subscription behavior, since a
//! naive implementation of either would hand the downstream observer a
//! fresh subscription object on every retry/resume attempt.

use flow_core::{FlowError, Obs, ObsOps, Observable, Observer, SharedFlowError, Subscription};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct Recorder<T> {
    next_items: RefCell<Vec<T>>,
    subscribe_count: RefCell<usize>,
    error_count: RefCell<usize>,
    complete_count: RefCell<usize>,
    subscription: RefCell<Option<Rc<dyn Subscription>>>,
}

impl<T> Recorder<T> {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            next_items: RefCell::new(Vec::new()),
            subscribe_count: RefCell::new(0),
            error_count: RefCell::new(0),
            complete_count: RefCell::new(0),
            subscription: RefCell::new(None),
        })
    }

    fn subscription(&self) -> Rc<dyn Subscription> {
        self.subscription.borrow().clone().expect("on_subscribe not yet called")
    }
}

impl<T: 'static> Observer<T> for Recorder<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        *self.subscribe_count.borrow_mut() += 1;
        subscription.request(u64::MAX);
        *self.subscription.borrow_mut() = Some(subscription);
    }
    fn on_next(&self, item: T) {
        self.next_items.borrow_mut().push(item);
    }
    fn on_error(&self, _error: SharedFlowError) {
        *self.error_count.borrow_mut() += 1;
    }
    fn on_complete(&self) {
        *self.complete_count.borrow_mut() += 1;
    }
}

/// A source that fails with a `runtime_error`-flavored error a fixed number
/// of times before completing normally, re-subscribed by `retry`/
/// `on_error_resume_next` once per attempt. Mirrors `source::fail`'s
/// "deliver immediately regardless of demand" shape for the failing
/// attempts, and `source::just`'s for the final successful one.
struct FlakySource {
    attempts: Cell<usize>,
    fail_times: usize,
    values: Vec<i32>,
}

impl Observable<i32> for FlakySource {
    fn subscribe(&self, observer: Rc<dyn Observer<i32>>) {
        let attempt = self.attempts.get();
        self.attempts.set(attempt + 1);
        let subscription = flow_core::NoopSubscription::new();
        observer.on_subscribe(subscription.clone());
        if attempt < self.fail_times {
            observer.on_error(FlowError::protocol_error("runtime_error").shared());
            return;
        }
        for item in &self.values {
            observer.on_next(*item);
        }
        observer.on_complete();
    }
}

fn is_runtime_error(error: &SharedFlowError) -> bool {
    error.message().contains("runtime_error")
}

#[test]
fn retry_hands_downstream_exactly_one_on_subscribe_across_attempts() {
    let source: Obs<i32> = Rc::new(FlakySource {
        attempts: Cell::new(0),
        fail_times: 2,
        values: vec![1, 2],
    });
    let retried = source.retry(is_runtime_error);

    let recorder = Recorder::new();
    retried.subscribe(recorder.clone());

    assert_eq!(*recorder.subscribe_count.borrow(), 1, "on_subscribe must fire once, not once per retry attempt");
    assert_eq!(*recorder.next_items.borrow(), vec![1, 2]);
    assert_eq!(*recorder.complete_count.borrow(), 1);
    assert_eq!(*recorder.error_count.borrow(), 0, "the two retried errors must never reach downstream");
}

#[test]
fn on_error_resume_next_hands_downstream_exactly_one_on_subscribe() {
    let source: Obs<i32> = Rc::new(FlakySource {
        attempts: Cell::new(0),
        fail_times: 1,
        values: vec![],
    });
    let fallback: Obs<i32> = flow_core::just(vec![9, 9]);
    let resumed = source.on_error_resume_next(is_runtime_error, fallback);

    let recorder = Recorder::new();
    resumed.subscribe(recorder.clone());

    assert_eq!(
        *recorder.subscribe_count.borrow(),
        1,
        "on_subscribe must fire once even though the fallback is a distinct observable"
    );
    assert_eq!(*recorder.next_items.borrow(), vec![9, 9]);
    assert_eq!(*recorder.complete_count.borrow(), 1);
    assert_eq!(*recorder.error_count.borrow(), 0);
}

#[test]
fn retry_forwards_a_non_matching_error_without_retrying() {
    let source: Obs<i32> = flow_core::fail(FlowError::protocol_error("fatal").shared());
    let retried = source.retry(is_runtime_error);

    let recorder = Recorder::new();
    retried.subscribe(recorder.clone());

    assert_eq!(*recorder.subscribe_count.borrow(), 1);
    assert_eq!(*recorder.error_count.borrow(), 1, "a non-matching error must be forwarded, not retried forever");
    assert_eq!(*recorder.complete_count.borrow(), 0);
}

#[test]
fn retry_proxy_cancel_is_silent_but_dispose_notifies() {
    let (_handle, live) = flow_core::mcast::<i32>();
    let retried = live.retry(is_runtime_error);
    let recorder = Recorder::new();
    retried.subscribe(recorder.clone());

    recorder.subscription().cancel();
    assert_eq!(*recorder.error_count.borrow(), 0, "cancel must not notify the observer");
    assert_eq!(*recorder.complete_count.borrow(), 0);

    let (_handle2, live2) = flow_core::mcast::<i32>();
    let retried2 = live2.retry(is_runtime_error);
    let recorder2 = Recorder::new();
    retried2.subscribe(recorder2.clone());

    recorder2.subscription().dispose();
    assert_eq!(*recorder2.error_count.borrow(), 1, "external dispose must deliver on_error(disposed)");
    assert_eq!(*recorder2.complete_count.borrow(), 0);
}

#[test]
fn resume_next_proxy_cancel_is_silent_but_dispose_notifies() {
    let (_handle, live) = flow_core::mcast::<i32>();
    let fallback: Obs<i32> = flow_core::never();
    let resumed = live.on_error_resume_next(is_runtime_error, fallback.clone());
    let recorder = Recorder::new();
    resumed.subscribe(recorder.clone());

    recorder.subscription().cancel();
    assert_eq!(*recorder.error_count.borrow(), 0, "cancel must not notify the observer");
    assert_eq!(*recorder.complete_count.borrow(), 0);

    let (_handle2, live2) = flow_core::mcast::<i32>();
    let resumed2 = live2.on_error_resume_next(is_runtime_error, fallback);
    let recorder2 = Recorder::new();
    resumed2.subscribe(recorder2.clone());

    recorder2.subscription().dispose();
    assert_eq!(*recorder2.error_count.borrow(), 1, "external dispose must deliver on_error(disposed)");
    assert_eq!(*recorder2.complete_count.borrow(), 0);
}

#[test]
fn terminal_event_is_delivered_at_most_once() {
    let recorder = Recorder::new();
    let source: Obs<i32> = flow_core::just(vec![1, 2, 3]);
    source.subscribe(recorder.clone());

    assert_eq!(*recorder.complete_count.borrow(), 1);
    assert_eq!(*recorder.error_count.borrow(), 0);
    // Sanity: complete and error are never both observed for the same
    // subscription.
    assert!(*recorder.complete_count.borrow() + *recorder.error_count.borrow() <= 1);
}
