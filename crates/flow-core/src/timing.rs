//! Clock-driven operators: `debounce` and `sample`, spec.md §4.4.5.
//!
//! Both ride on [`crate::coordinator::Coordinator`]'s delayed-action queue
//! rather than a real-time timer thread, so tests can drive them
//! deterministically with a [`crate::time::MockClock`] plus manual
//! `run_until_idle` pumps instead of sleeping wall-clock time.

use crate::coordinator::Coordinator;
use crate::disposable::{Disposable, SimpleDisposable};
use crate::error::SharedFlowError;
use crate::observable::{Obs, Observable};
use crate::observer::Observer;
use crate::subscription::Subscription;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Emits the most recent item only once `quiet_period` has elapsed without
/// a further item arriving; resets the timer on every new item. A terminal
/// event flushes any pending item first.
pub fn debounce<T: Clone + 'static>(upstream: Obs<T>, coordinator: Rc<Coordinator>, quiet_period: Duration) -> Obs<T> {
    struct DebounceObservable<T> {
        upstream: Obs<T>,
        coordinator: Rc<Coordinator>,
        quiet_period: Duration,
    }
    struct DebounceState<T> {
        downstream: Rc<dyn Observer<T>>,
        coordinator: Rc<Coordinator>,
        quiet_period: Duration,
        pending: Rc<RefCell<Option<T>>>,
        timer: RefCell<Option<Rc<dyn Disposable>>>,
        disposed: Rc<SimpleDisposable>,
    }
    impl<T: Clone + 'static> DebounceState<T> {
        fn arm_timer(self: &Rc<Self>) {
            if let Some(old) = self.timer.borrow_mut().take() {
                old.dispose();
            }
            let state = self.clone();
            let action = self.coordinator.delay(self.quiet_period, move || {
                if state.disposed.is_disposed() {
                    return;
                }
                if let Some(item) = state.pending.borrow_mut().take() {
                    state.downstream.on_next(item);
                }
            });
            *self.timer.borrow_mut() = Some(action);
        }

        fn flush_pending(&self) {
            if let Some(old) = self.timer.borrow_mut().take() {
                old.dispose();
            }
            if let Some(item) = self.pending.borrow_mut().take() {
                self.downstream.on_next(item);
            }
        }
    }
    struct DebounceObserver<T> {
        state: Rc<DebounceState<T>>,
    }
    impl<T: Clone + 'static> Observer<T> for DebounceObserver<T> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            self.state.downstream.on_subscribe(subscription);
        }
        fn on_next(&self, item: T) {
            *self.state.pending.borrow_mut() = Some(item);
            self.state.coordinator.observability().trace("debounce", "quiet-period timer reset");
            self.state.arm_timer();
        }
        fn on_error(&self, error: SharedFlowError) {
            self.state.disposed.dispose();
            self.state.coordinator.observability().debug("debounce", "terminated by on_error");
            self.state.downstream.on_error(error);
        }
        fn on_complete(&self) {
            self.state.disposed.dispose();
            self.state.flush_pending();
            self.state.coordinator.observability().debug("debounce", "terminated by on_complete");
            self.state.downstream.on_complete();
        }
    }
    impl<T: Clone + 'static> Observable<T> for DebounceObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            self.coordinator.observability().debug("debounce", "subscribed");
            let state = Rc::new(DebounceState {
                downstream: observer,
                coordinator: self.coordinator.clone(),
                quiet_period: self.quiet_period,
                pending: Rc::new(RefCell::new(None)),
                timer: RefCell::new(None),
                disposed: Rc::new(SimpleDisposable::new()),
            });
            self.upstream.subscribe(Rc::new(DebounceObserver { state }));
        }
    }
    Rc::new(DebounceObservable {
        upstream,
        coordinator,
        quiet_period,
    })
}

/// Emits the most recently received item once per `period`, skipping the
/// tick if no new item has arrived since the last sample.
pub fn sample<T: Clone + 'static>(upstream: Obs<T>, coordinator: Rc<Coordinator>, period: Duration) -> Obs<T> {
    struct SampleObservable<T> {
        upstream: Obs<T>,
        coordinator: Rc<Coordinator>,
        period: Duration,
    }
    struct SampleState<T> {
        downstream: Rc<dyn Observer<T>>,
        coordinator: Rc<Coordinator>,
        latest: RefCell<Option<T>>,
        timer: RefCell<Option<Rc<dyn Disposable>>>,
    }
    struct SampleObserver<T> {
        state: Rc<SampleState<T>>,
    }
    impl<T: Clone + 'static> Observer<T> for SampleObserver<T> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            self.state.downstream.on_subscribe(subscription);
        }
        fn on_next(&self, item: T) {
            *self.state.latest.borrow_mut() = Some(item);
        }
        fn on_error(&self, error: SharedFlowError) {
            if let Some(timer) = self.state.timer.borrow_mut().take() {
                timer.dispose();
            }
            self.state.coordinator.observability().debug("sample", "terminated by on_error");
            self.state.downstream.on_error(error);
        }
        fn on_complete(&self) {
            if let Some(timer) = self.state.timer.borrow_mut().take() {
                timer.dispose();
            }
            self.state.coordinator.observability().debug("sample", "terminated by on_complete");
            self.state.downstream.on_complete();
        }
    }
    impl<T: Clone + 'static> Observable<T> for SampleObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            self.coordinator.observability().debug("sample", "subscribed");
            let state = Rc::new(SampleState {
                downstream: observer,
                coordinator: self.coordinator.clone(),
                latest: RefCell::new(None),
                timer: RefCell::new(None),
            });
            let tick_state = state.clone();
            let timer = self.coordinator.delay_fn(self.period, move || {
                if let Some(item) = tick_state.latest.borrow_mut().take() {
                    tick_state.downstream.on_next(item);
                }
                true
            });
            *state.timer.borrow_mut() = Some(timer);
            self.upstream.subscribe(Rc::new(SampleObserver { state }));
        }
    }
    Rc::new(SampleObservable {
        upstream,
        coordinator,
        period,
    })
}
