//! Exercises the cross-thread SPSC bridge, spec.md §8 scenario 10: a
//! producer thread pushes a run of integers into an `AsyncResource`, and a
//! single-threaded `Coordinator` on the main thread observes them in order.
//!
//! Unlike the cold-source tests elsewhere, this genuinely crosses a thread
//! boundary, so it uses `Coordinator::with_system_clock` and repeatedly
//! pumps `run_until_idle` with a short sleep rather than a `MockClock` —
//! the bridge's poll loop is scheduled against real elapsed time
//! (`DEFAULT_POLL_PERIOD`).

use flow_core::{channel, observe_resource, Coordinator, ObsOps, Observability};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[test]
fn producer_thread_feeds_five_thousand_items_in_order() {
    const COUNT: i32 = 5000;
    let (producer, resource) = channel::<i32>(64);

    let worker = std::thread::spawn(move || {
        for i in 0..COUNT {
            producer.push(i).expect("consumer resource must still be open");
        }
        producer.close();
    });

    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let observable = observe_resource(coordinator.clone(), resource);

    let received = Rc::new(RefCell::new(Vec::new()));
    let completed = Rc::new(RefCell::new(false));
    let received_sink = received.clone();
    let completed_sink = completed.clone();
    let _subscription = observable.for_each(
        coordinator.clone(),
        move |item: i32| received_sink.borrow_mut().push(item),
        |_err| panic!("the resource must not fail in this test"),
        move || *completed_sink.borrow_mut() = true,
    );

    let deadline = Instant::now() + Duration::from_secs(10);
    while !*completed.borrow() && Instant::now() < deadline {
        coordinator.run_until_idle();
        std::thread::sleep(Duration::from_millis(2));
    }

    worker.join().expect("producer thread must not panic");
    assert!(*completed.borrow(), "the bridge must complete once the producer closes the channel");
    let expected: Vec<i32> = (0..COUNT).collect();
    assert_eq!(*received.borrow(), expected);
}

#[test]
fn a_second_subscribe_on_the_same_observed_handle_fails_instead_of_sharing_state() {
    let (producer, resource) = channel::<i32>(8);
    producer.push(1).unwrap();
    producer.close();

    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let observable = observe_resource(coordinator.clone(), resource);

    let first_items = Rc::new(RefCell::new(Vec::new()));
    let first_items_sink = first_items.clone();
    let _first_sub = observable.for_each(
        coordinator.clone(),
        move |i| first_items_sink.borrow_mut().push(i),
        |_e| {},
        || {},
    );

    let second_failed = Rc::new(RefCell::new(false));
    let second_failed_sink = second_failed.clone();
    let _second_sub = observable.for_each(
        coordinator.clone(),
        |_i: i32| panic!("a second subscriber on the same observed handle must never receive data"),
        move |_err| *second_failed_sink.borrow_mut() = true,
        || panic!("a second subscriber on the same observed handle must not complete cleanly"),
    );

    assert!(
        *second_failed.borrow(),
        "subscribing twice to the same observed handle must fail the second subscriber immediately"
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    while first_items.borrow().is_empty() && Instant::now() < deadline {
        coordinator.run_until_idle();
        std::thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(*first_items.borrow(), vec![1]);
}

#[test]
fn try_push_does_not_block_when_the_channel_is_full() {
    let (producer, _resource) = channel::<i32>(1);
    assert!(producer.try_push(1).is_ok());
    // The bounded channel now has no free slot and nothing is draining it.
    assert!(producer.try_push(2).is_err(), "try_push must not block when the channel is full");
}
