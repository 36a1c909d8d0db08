//! Universal subscription-protocol invariants, spec.md §8 points 1-5,
//! exercised against a handful of representative operators rather than
//! every operator in the crate (each operator's own module tests cover its
//! specific behavior; these contracts are about the protocol every one of
//! them must honor).

use flow_core::{
    empty, fail, just, mcast, range, Disposable, Event, Obs, ObsOps, Observable, Observer, SharedFlowError, Subscription,
};
use std::cell::RefCell;
use std::rc::Rc;

struct Recorder<T> {
    events: RefCell<Vec<Event<T>>>,
    subscribe_count: RefCell<usize>,
    subscription: RefCell<Option<Rc<dyn Subscription>>>,
}

impl<T> Recorder<T> {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            events: RefCell::new(Vec::new()),
            subscribe_count: RefCell::new(0),
            subscription: RefCell::new(None),
        })
    }

    fn subscription(&self) -> Rc<dyn Subscription> {
        self.subscription.borrow().clone().expect("on_subscribe not yet called")
    }

    fn next_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Next(_)))
            .count()
    }

    fn terminal_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::Error(_) | Event::Complete))
            .count()
    }

    fn total_events(&self) -> usize {
        self.events.borrow().len()
    }
}

impl<T: 'static> Observer<T> for Recorder<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        *self.subscribe_count.borrow_mut() += 1;
        *self.subscription.borrow_mut() = Some(subscription);
    }
    fn on_next(&self, item: T) {
        self.events.borrow_mut().push(Event::Next(item));
    }
    fn on_error(&self, error: SharedFlowError) {
        self.events.borrow_mut().push(Event::Error(error));
    }
    fn on_complete(&self) {
        self.events.borrow_mut().push(Event::Complete);
    }
}

#[test]
fn on_subscribe_fires_exactly_once_before_any_data() {
    let recorder = Recorder::new();
    let source: Obs<i32> = just(vec![1, 2, 3]);
    source.subscribe(recorder.clone());

    assert_eq!(*recorder.subscribe_count.borrow(), 1, "on_subscribe must fire exactly once");
    assert_eq!(recorder.total_events(), 0, "no data or terminal event before the first request");

    recorder.subscription().request(10);
    assert_eq!(*recorder.subscribe_count.borrow(), 1, "a later request must not trigger a second on_subscribe");
    assert_eq!(recorder.next_count(), 3);
}

#[test]
fn never_delivers_more_than_requested() {
    let recorder = Recorder::new();
    let source: Obs<i64> = range(0, 10);
    source.subscribe(recorder.clone());

    recorder.subscription().request(3);
    assert_eq!(recorder.next_count(), 3, "a cold source must honor the exact requested count");

    recorder.subscription().request(2);
    assert_eq!(recorder.next_count(), 5);

    recorder.subscription().request(100);
    assert_eq!(recorder.next_count(), 10, "requesting past the end must not over-deliver");
}

#[test]
fn at_most_one_terminal_event_and_nothing_after_it() {
    let recorder = Recorder::new();
    let source: Obs<i32> = just(vec![1, 2]).take(2);
    source.subscribe(recorder.clone());

    recorder.subscription().request(10);
    assert_eq!(recorder.next_count(), 2);
    assert_eq!(recorder.terminal_count(), 1, "exactly one terminal event");
    let total_after_completion = recorder.total_events();

    // A further request after the terminal event must not resurrect the
    // stream or produce a second terminal event.
    recorder.subscription().request(10);
    assert_eq!(recorder.total_events(), total_after_completion);
}

#[test]
fn error_and_complete_are_mutually_exclusive() {
    let recorder = Recorder::new();
    let source: Obs<i32> = fail(flow_core::FlowError::protocol_error("boom").shared());
    source.subscribe(recorder.clone());

    assert_eq!(recorder.terminal_count(), 1);
    let has_error = recorder.events.borrow().iter().any(|e| matches!(e, Event::Error(_)));
    let has_complete = recorder.events.borrow().iter().any(|e| matches!(e, Event::Complete));
    assert!(has_error && !has_complete, "fail() must deliver on_error, not on_complete");
}

#[test]
fn empty_completes_without_ever_emitting() {
    let recorder = Recorder::new();
    let source: Obs<i32> = empty();
    source.subscribe(recorder.clone());

    assert_eq!(recorder.next_count(), 0);
    assert_eq!(recorder.terminal_count(), 1);
}

#[test]
fn cancelling_a_subscription_stops_further_delivery() {
    let (handle, source) = mcast::<i32>();
    let recorder = Recorder::new();
    source.subscribe(recorder.clone());

    handle.push(1);
    handle.push(2);
    assert_eq!(recorder.next_count(), 2);

    recorder.subscription().cancel();
    handle.push(3);
    handle.push(4);
    assert_eq!(recorder.next_count(), 2, "no on_next may arrive after cancel/dispose");
    assert_eq!(recorder.terminal_count(), 0, "cancel is silent: no terminal event reaches the observer");
}

#[test]
fn disposing_a_live_subscription_externally_delivers_on_error_disposed() {
    let (handle, source) = mcast::<i32>();
    let recorder = Recorder::new();
    source.subscribe(recorder.clone());

    handle.push(1);
    assert_eq!(recorder.next_count(), 1);

    recorder.subscription().dispose();
    assert_eq!(recorder.terminal_count(), 1, "external dispose must notify the observer, unlike cancel");
    let delivered_disposed = recorder.events.borrow().iter().any(|e| {
        matches!(e, Event::Error(err) if err.code() == flow_core::FlowError::disposed().code())
    });
    assert!(delivered_disposed, "dispose must deliver on_error(disposed)");

    handle.push(2);
    assert_eq!(recorder.next_count(), 1, "no on_next may arrive after dispose");
    assert_eq!(recorder.terminal_count(), 1, "disposing an already-terminated subscription is a no-op");
}

#[test]
fn subscribe_returns_a_disposable_equivalent_to_the_handed_out_subscription() {
    let recorder = Recorder::new();
    let source: Obs<i32> = just(vec![1, 2, 3]);
    source.subscribe(recorder.clone());

    let sub = recorder.subscription();
    assert!(!sub.is_disposed());
    sub.dispose();
    assert!(sub.is_disposed());
    // Idempotent: disposing twice is a no-op, not a panic.
    sub.dispose();
    assert!(sub.is_disposed());
}
