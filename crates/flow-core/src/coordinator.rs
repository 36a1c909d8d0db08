//! The single-threaded cooperative scheduler every flow-graph object runs
//! under, per spec.md §4.1.
//!
//! Grounded on `spark-core/src/runtime/executor.rs`'s `TaskExecutor` (a
//! boxed-closure run queue) combined with `spark-core/src/time/clock.rs`'s
//! clock abstraction for delayed work. Unlike the teacher's executor, which
//! hands tasks to a thread pool, a `Coordinator` runs everything inline on
//! whichever thread calls `run_until_idle`/`advance_to` — matching spec.md's
//! explicit single-threaded, re-entrant-safe design (§9).

use crate::action::Action;
use crate::disposable::Disposable;
use crate::observability::{metric_names, Observability};
use crate::time::{MonotonicInstant, SteadyClock, SystemClock};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

struct DelayedEntry {
    due: MonotonicInstant,
    seq: u64,
    action: Rc<Action>,
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl Eq for DelayedEntry {}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest-due entry
        // first, tie-broken by insertion order.
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Owns the run queue, the delayed-action queue, and a weak registry of
/// child disposables created on it (used to cascade disposal when the host
/// actor shuts the coordinator down).
pub struct Coordinator {
    clock: Rc<dyn SteadyClock>,
    observability: Observability,
    immediate: RefCell<VecDeque<Rc<Action>>>,
    delayed: RefCell<BinaryHeap<DelayedEntry>>,
    next_seq: RefCell<u64>,
    children: RefCell<Vec<Weak<dyn Disposable>>>,
}

impl Coordinator {
    pub fn new(clock: Rc<dyn SteadyClock>, observability: Observability) -> Rc<Self> {
        Rc::new(Self {
            clock,
            observability,
            immediate: RefCell::new(VecDeque::new()),
            delayed: RefCell::new(BinaryHeap::new()),
            next_seq: RefCell::new(0),
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn with_system_clock(observability: Observability) -> Rc<Self> {
        Self::new(Rc::new(SystemClock), observability)
    }

    pub fn observability(&self) -> &Observability {
        &self.observability
    }

    pub fn steady_time(&self) -> MonotonicInstant {
        self.clock.now()
    }

    /// Enqueues `body` to run on the next `run_until_idle` pump, in FIFO
    /// order relative to other immediately-posted work.
    pub fn post(&self, body: impl FnOnce() + 'static) -> Rc<Action> {
        let action = Action::new(body);
        self.immediate.borrow_mut().push_back(action.clone());
        self.observability
            .metrics()
            .increment_counter(metric_names::ACTIONS_SCHEDULED, 1);
        action
    }

    /// Alias for [`Coordinator::post`], matching spec.md §4.1's `schedule`
    /// naming for graph wiring call sites.
    pub fn schedule(&self, body: impl FnOnce() + 'static) -> Rc<Action> {
        self.post(body)
    }

    pub fn delay(&self, after: Duration, body: impl FnOnce() + 'static) -> Rc<Action> {
        self.delay_until(self.steady_time().saturating_add(after), body)
    }

    pub fn delay_until(&self, due: MonotonicInstant, body: impl FnOnce() + 'static) -> Rc<Action> {
        let action = Action::new(body);
        let seq = {
            let mut next = self.next_seq.borrow_mut();
            let seq = *next;
            *next += 1;
            seq
        };
        self.delayed.borrow_mut().push(DelayedEntry {
            due,
            seq,
            action: action.clone(),
        });
        self.observability
            .metrics()
            .increment_counter(metric_names::ACTIONS_SCHEDULED, 1);
        self.observability
            .metrics()
            .set_gauge(metric_names::DELAYED_QUEUE_DEPTH, self.delayed.borrow().len() as i64);
        action
    }

    /// Schedules `tick` repeatedly every `period`, matching spec.md §4.1's
    /// `delay_fn` combinator used by `interval`: `tick` returns `false` to
    /// stop the chain on its own (e.g. once a bounded count is reached), and
    /// the returned handle stops it from the outside via `dispose`.
    pub fn delay_fn(
        self: &Rc<Self>,
        period: Duration,
        tick: impl FnMut() -> bool + 'static,
    ) -> Rc<dyn Disposable> {
        let cancelled = Rc::new(crate::disposable::SimpleDisposable::new());
        self.schedule_tick(period, Rc::new(RefCell::new(tick)), cancelled.clone());
        cancelled
    }

    fn schedule_tick(
        self: &Rc<Self>,
        period: Duration,
        tick: Rc<RefCell<dyn FnMut() -> bool>>,
        cancelled: Rc<crate::disposable::SimpleDisposable>,
    ) {
        let coordinator = self.clone();
        self.delay(period, move || {
            if cancelled.is_disposed() {
                return;
            }
            let keep_going = (tick.borrow_mut())();
            if keep_going && !cancelled.is_disposed() {
                coordinator.schedule_tick(period, tick, cancelled);
            }
        });
    }

    /// Registers a disposable as a child of this coordinator: when the
    /// coordinator is torn down via [`Coordinator::dispose_all`], every live
    /// child is disposed too. Matches spec.md §4.1's `add_child`.
    pub fn add_child(&self, child: Rc<dyn Disposable>) {
        self.children.borrow_mut().push(Rc::downgrade(&child));
        self.observability
            .metrics()
            .set_gauge(metric_names::WATCHED_DISPOSABLES, self.children.borrow().len() as i64);
    }

    /// Alias used by operators that want `add_child`'s semantics under the
    /// "watch" name spec.md §4.1 also uses for this concept.
    pub fn watch(&self, child: Rc<dyn Disposable>) {
        self.add_child(child)
    }

    /// Runs every currently-queued immediate action, then fires any delayed
    /// actions already due, repeating until no immediate work remains.
    /// Mirrors the re-entrant pump loop spec.md §9 requires: actions posted
    /// by other actions while draining are picked up in the same pump.
    pub fn run_until_idle(&self) {
        loop {
            self.drain_due_delayed();
            let next = self.immediate.borrow_mut().pop_front();
            match next {
                Some(action) => {
                    action.run();
                    self.observability
                        .metrics()
                        .increment_counter(metric_names::ACTIONS_INVOKED, 1);
                }
                None => break,
            }
        }
    }

    /// Test/simulation hook: advances the clock is the caller's
    /// responsibility (via a [`crate::time::MockClock`]); this only fires
    /// whatever delayed actions are now due and drains the immediate queue.
    pub fn pump(&self) {
        self.run_until_idle();
    }

    fn drain_due_delayed(&self) {
        let now = self.steady_time();
        loop {
            let due = {
                let heap = self.delayed.borrow();
                match heap.peek() {
                    Some(entry) if entry.due <= now => true,
                    _ => false,
                }
            };
            if !due {
                break;
            }
            let entry = self.delayed.borrow_mut().pop().expect("peeked Some above");
            self.immediate.borrow_mut().push_back(entry.action);
        }
        self.observability
            .metrics()
            .set_gauge(metric_names::DELAYED_QUEUE_DEPTH, self.delayed.borrow().len() as i64);
    }

    /// Disposes every still-live child registered via `add_child`/`watch`.
    pub fn dispose_all(&self) {
        for weak in self.children.borrow_mut().drain(..) {
            if let Some(child) = weak.upgrade() {
                child.dispose();
            }
        }
    }
}
