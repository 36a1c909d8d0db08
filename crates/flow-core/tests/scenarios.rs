//! The concrete end-to-end scenarios from spec.md §8, one test per
//! numbered scenario. Scenario 10 (the SPSC bridge feeding 5000 items
//! across a thread) is covered by `tests/async_resource_bridge.rs` instead
//! of being duplicated here.

use flow_core::{
    auto_connect, combine_latest, defer, fail, iota, just, mcast, on_backpressure_buffer, range, retry, Coordinator,
    FlowError, MockClock, ObsOps, Observability, Observable, OverflowStrategy, Subscription,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Scenario 1: `iota(1).take(5)` reduced to a sum, delivered to a single
/// `for_each` subscriber.
#[test]
fn iota_take_five_sums_to_fifteen() {
    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let summed = iota(1).take(5).reduce(0i64, |acc, x| acc + x);

    let received = Rc::new(RefCell::new(Vec::new()));
    let completed = Rc::new(Cell::new(false));
    let received_sink = received.clone();
    let completed_sink = completed.clone();
    let _subscription = summed.for_each(
        coordinator,
        move |sum: i64| received_sink.borrow_mut().push(sum),
        |err| panic!("unexpected error: {err}"),
        move || completed_sink.set(true),
    );

    assert_eq!(*received.borrow(), vec![15]);
    assert!(completed.get());
}

/// Scenario 2: a multicaster pushes `{1,2,3,4,5}` to two subscribers that
/// each pre-request far more than they'll ever see; both observe the whole
/// sequence in order, then complete once the multicaster is closed.
#[test]
fn multicaster_broadcasts_the_same_sequence_to_every_subscriber() {
    let (push, source) = mcast::<i32>();

    let a_received = Rc::new(RefCell::new(Vec::new()));
    let a_completed = Rc::new(Cell::new(false));
    subscribe_and_request_many(&source, a_received.clone(), a_completed.clone());

    let b_received = Rc::new(RefCell::new(Vec::new()));
    let b_completed = Rc::new(Cell::new(false));
    subscribe_and_request_many(&source, b_received.clone(), b_completed.clone());

    for item in [1, 2, 3, 4, 5] {
        push.push(item);
    }
    push.complete();

    assert_eq!(*a_received.borrow(), vec![1, 2, 3, 4, 5]);
    assert_eq!(*b_received.borrow(), vec![1, 2, 3, 4, 5]);
    assert!(a_completed.get());
    assert!(b_completed.get());
}

fn subscribe_and_request_many(
    source: &flow_core::Obs<i32>,
    received: Rc<RefCell<Vec<i32>>>,
    completed: Rc<Cell<bool>>,
) {
    let observer = flow_core::ClosureObserver::new(
        move |item: i32| received.borrow_mut().push(item),
        |err| panic!("unexpected error: {err}"),
        move || completed.set(true),
    );
    source.subscribe(observer.clone());
    observer.subscription().expect("mcast hands a subscription to every subscriber").request(1000);
}

/// Scenario 3: `publish` over a hot source with an auto-connect threshold of
/// 2 — the first subscriber observes nothing until the second arrives and
/// triggers `connect()`; a late third subscriber only sees items pushed
/// after it joined.
#[test]
fn auto_connect_at_threshold_two_shares_history_only_with_pre_connect_subscribers() {
    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let (push, source) = mcast::<i32>();
    let shared = auto_connect(source, coordinator, 2);

    let a_received = Rc::new(RefCell::new(Vec::new()));
    let a_received_sink = a_received.clone();
    let a_observer = flow_core::ClosureObserver::new(move |item: i32| a_received_sink.borrow_mut().push(item), |_e| {}, || {});
    shared.subscribe(a_observer.clone());
    a_observer.subscription().unwrap().request(1000);
    assert!(a_received.borrow().is_empty(), "connecting requires a second subscriber");

    let b_received = Rc::new(RefCell::new(Vec::new()));
    let b_received_sink = b_received.clone();
    let b_observer = flow_core::ClosureObserver::new(move |item: i32| b_received_sink.borrow_mut().push(item), |_e| {}, || {});
    shared.subscribe(b_observer.clone());
    b_observer.subscription().unwrap().request(1000);

    for item in [0, 1, 2, 3, 4] {
        push.push(item);
    }

    assert_eq!(*a_received.borrow(), vec![0, 1, 2, 3, 4]);
    assert_eq!(*b_received.borrow(), vec![0, 1, 2, 3, 4]);

    let c_received = Rc::new(RefCell::new(Vec::new()));
    let c_received_sink = c_received.clone();
    let c_observer = flow_core::ClosureObserver::new(move |item: i32| c_received_sink.borrow_mut().push(item), |_e| {}, || {});
    shared.subscribe(c_observer.clone());
    c_observer.subscription().unwrap().request(1000);

    push.push(5);
    push.push(6);

    assert_eq!(*c_received.borrow(), vec![5, 6], "a late subscriber must not see history from before it joined");
    assert_eq!(*a_received.borrow(), vec![0, 1, 2, 3, 4, 5, 6]);
}

/// Scenario 4: `on_backpressure_buffer(10, drop_newest)` against a source
/// that outruns demand keeps only the first 10 items buffered.
#[test]
fn backpressure_buffer_drop_newest_keeps_the_earliest_items() {
    let upstream = range(1, 99);
    let buffered = on_backpressure_buffer(upstream, 10, OverflowStrategy::DropNewest);
    let received = collect_passively(&buffered, 100);
    assert_eq!(received, (1..=10).collect::<Vec<i64>>());
}

/// Scenario 5: the same setup with `drop_oldest` keeps the most recent 10
/// items instead.
#[test]
fn backpressure_buffer_drop_oldest_keeps_the_latest_items() {
    let upstream = range(1, 99);
    let buffered = on_backpressure_buffer(upstream, 10, OverflowStrategy::DropOldest);
    let received = collect_passively(&buffered, 100);
    assert_eq!(received, (90..=99).collect::<Vec<i64>>());
}

/// Subscribes without requesting anything up front (letting upstream run
/// unboundedly into the buffer, since `on_backpressure_buffer` always
/// requests `UNBOUNDED` from its source), then issues a single late
/// `request(n)` the way a passive downstream subscriber eventually would.
fn collect_passively(source: &flow_core::Obs<i64>, late_request: u64) -> Vec<i64> {
    let received = Rc::new(RefCell::new(Vec::new()));
    let received_sink = received.clone();
    let observer = flow_core::ClosureObserver::new(move |item: i64| received_sink.borrow_mut().push(item), |_e| {}, || {});
    source.subscribe(observer.clone());
    observer.subscription().unwrap().request(late_request);
    received.borrow().clone()
}

/// Scenario 6: `combine_latest` over two hand-pushed sources, summed,
/// reproduces the exact emitted sequence from spec.md §8.
#[test]
fn combine_latest_sum_matches_the_documented_sequence() {
    let (push1, src1) = mcast::<i32>();
    let (push2, src2) = mcast::<i32>();
    let combined = combine_latest(vec![src1, src2]).map(|pair| pair[0] + pair[1]);

    let received = Rc::new(RefCell::new(Vec::new()));
    let completed = Rc::new(Cell::new(false));
    let received_sink = received.clone();
    let completed_sink = completed.clone();
    let observer = flow_core::ClosureObserver::new(
        move |sum: i32| received_sink.borrow_mut().push(sum),
        |err| panic!("unexpected error: {err}"),
        move || completed_sink.set(true),
    );
    combined.subscribe(observer);

    push1.push(1);
    push2.push(2); // emits 3
    push1.push(4); // emits 6
    push2.push(5); // emits 9
    push1.complete();
    push2.push(6); // emits 10
    assert!(!completed.get(), "combine_latest only completes once every input has");
    push2.complete();

    assert_eq!(*received.borrow(), vec![3, 6, 9, 10]);
    assert!(completed.get());
}

/// Scenario 7: `debounce` only emits a value once a quiet period has
/// elapsed without a further arrival, using a `MockClock` to drive the
/// timer deterministically rather than chasing wall-clock timing.
#[test]
fn debounce_emits_only_after_a_quiet_period() {
    let clock = Rc::new(MockClock::new());
    let coordinator = Coordinator::new(clock.clone(), Observability::noop());
    let (push, source) = mcast::<i32>();
    let debounced = source.debounce(coordinator.clone(), Duration::from_millis(100));

    let received = Rc::new(RefCell::new(Vec::new()));
    let received_sink = received.clone();
    let observer = flow_core::ClosureObserver::new(move |item: i32| received_sink.borrow_mut().push(item), |_e| {}, || {});
    debounced.subscribe(observer);

    push.push(1);
    coordinator.run_until_idle();
    clock.advance(Duration::from_millis(50)); // t=50
    push.push(2);
    coordinator.run_until_idle();
    clock.advance(Duration::from_millis(60)); // t=110, 60ms since the last item: too soon
    push.push(4);
    coordinator.run_until_idle();
    clock.advance(Duration::from_millis(70)); // t=180, 70ms since the last item: still too soon
    push.push(8);
    coordinator.run_until_idle();
    assert!(received.borrow().is_empty(), "no item has gone 100ms without a follow-up yet");

    clock.advance(Duration::from_millis(100)); // t=280, 100ms of silence since the last push
    coordinator.run_until_idle();
    assert_eq!(*received.borrow(), vec![8]);
}

/// Scenario 8: `prefix_and_tail(3)` on a 7-item source emits exactly one
/// `(prefix, tail)` pair, and the tail relays the remaining items.
#[test]
fn prefix_and_tail_splits_into_a_fixed_prefix_and_a_live_tail() {
    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let source = iota(1).take(7);
    let split = source.prefix_and_tail(3);

    let pairs: Rc<RefCell<Vec<(Vec<i64>, flow_core::Obs<i64>)>>> = Rc::new(RefCell::new(Vec::new()));
    let pairs_sink = pairs.clone();
    let _subscription = split.for_each(
        coordinator.clone(),
        move |pair| pairs_sink.borrow_mut().push(pair),
        |err| panic!("unexpected error: {err}"),
        || {},
    );

    assert_eq!(pairs.borrow().len(), 1, "prefix_and_tail must emit exactly one tuple");
    let (prefix, tail) = pairs.borrow()[0].clone();
    assert_eq!(prefix, vec![1, 2, 3]);

    let tail_items = Rc::new(RefCell::new(Vec::new()));
    let tail_completed = Rc::new(Cell::new(false));
    let tail_items_sink = tail_items.clone();
    let tail_completed_sink = tail_completed.clone();
    let _tail_subscription = tail.for_each(
        coordinator,
        move |item: i64| tail_items_sink.borrow_mut().push(item),
        |err| panic!("unexpected error: {err}"),
        move || tail_completed_sink.set(true),
    );

    assert_eq!(*tail_items.borrow(), vec![4, 5, 6, 7]);
    assert!(tail_completed.get());
}

/// Scenario 9: `retry` resubscribes to a source that fails twice with a
/// matching error before completing successfully with `[1, 2]`.
#[test]
fn retry_recovers_after_matching_errors_then_succeeds() {
    const RUNTIME_ERROR: &str = "example.runtime_error";
    let attempts = Rc::new(Cell::new(0u32));
    let attempts_for_factory = attempts.clone();
    let source = defer(move || {
        let attempt = attempts_for_factory.get();
        attempts_for_factory.set(attempt + 1);
        if attempt < 2 {
            fail(FlowError::new(RUNTIME_ERROR, "transient failure").shared())
        } else {
            just(vec![1, 2])
        }
    });
    let retried = retry(source, |err| err.code() == RUNTIME_ERROR);

    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let received = Rc::new(RefCell::new(Vec::new()));
    let completed = Rc::new(Cell::new(false));
    let received_sink = received.clone();
    let completed_sink = completed.clone();
    let _subscription = retried.for_each(
        coordinator,
        move |item: i32| received_sink.borrow_mut().push(item),
        |err| panic!("retry must have exhausted the matching errors: {err}"),
        move || completed_sink.set(true),
    );

    assert_eq!(*received.borrow(), vec![1, 2]);
    assert!(completed.get());
    assert_eq!(attempts.get(), 3, "two failed attempts plus the final successful one");
}
