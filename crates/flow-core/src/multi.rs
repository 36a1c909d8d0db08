//! Multi-input operators: `merge`, `concat`, `zip_with`, `combine_latest`,
//! spec.md §4.4.3.
//!
//! Grounded on `examples/original_source/libcaf_core/caf/detail/combine_latest.hpp`
//! for `combine_latest`'s per-input latest-value slots and completion
//! bookkeeping, and on the CAF `flow::op::merge`/`flow::op::concat` shape
//! (subscribe-all-at-once vs. subscribe-sequentially) for the other two.

use crate::disposable::{CompositeDisposable, Disposable, SimpleDisposable};
use crate::error::SharedFlowError;
use crate::observable::{Obs, Observable};
use crate::observer::Observer;
use crate::sealed::Sealed;
use crate::subscription::Subscription;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// `merge`: subscribes to at most [`crate::config::FlowConfig::merge_max_concurrent`]
/// inputs at a time, buffering each active input's arrivals up to its own
/// [`crate::config::FlowConfig::merge_max_pending_per_input`] budget so one
/// fast source cannot starve the others of downstream demand. Completes
/// once every input (active or still-queued) has completed; fails
/// immediately (cancelling every other input) if any input fails, per
/// spec.md §4.4.3. Uses [`crate::config::FlowConfig::default`]'s limits; see
/// [`merge_with_config`] to override them.
pub fn merge<T: 'static>(inputs: Vec<Obs<T>>) -> Obs<T> {
    merge_with_config(inputs, crate::config::FlowConfig::default())
}

/// `merge`, overriding `config.merge_max_concurrent`/`merge_max_pending_per_input`.
pub fn merge_with_config<T: 'static>(inputs: Vec<Obs<T>>, config: crate::config::FlowConfig) -> Obs<T> {
    struct MergeObservable<T> {
        inputs: RefCell<Option<Vec<Obs<T>>>>,
        max_concurrent: usize,
        max_pending_per_input: u64,
    }
    struct Slot<T> {
        queue: VecDeque<T>,
        subscription: Option<Rc<dyn Subscription>>,
        done: bool,
    }
    struct Shared<T> {
        downstream: Rc<dyn Observer<T>>,
        slots: RefCell<Vec<Slot<T>>>,
        pending_inputs: RefCell<VecDeque<Obs<T>>>,
        remaining_total: RefCell<usize>,
        terminated: RefCell<bool>,
        cursor: RefCell<usize>,
        max_pending_per_input: u64,
    }
    impl<T: 'static> Shared<T> {
        fn start_slot(self: &Rc<Self>, slot_index: usize, input: Obs<T>) {
            struct BranchObserver<T> {
                shared: Rc<Shared<T>>,
                slot_index: usize,
            }
            impl<T: 'static> Observer<T> for BranchObserver<T> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    // Store the subscription before requesting: a
                    // synchronous cold source may deliver items (and this
                    // branch's own top-up `request(1)` calls, see
                    // `drain_downstream`) inline within this `request`
                    // call, and those top-ups need the slot's subscription
                    // slot already populated.
                    self.shared.slots.borrow_mut()[self.slot_index].subscription = Some(subscription.clone());
                    subscription.request(self.shared.max_pending_per_input);
                }
                fn on_next(&self, item: T) {
                    if *self.shared.terminated.borrow() {
                        return;
                    }
                    self.shared.slots.borrow_mut()[self.slot_index].queue.push_back(item);
                    self.shared.drain_downstream();
                }
                fn on_error(&self, error: SharedFlowError) {
                    self.shared.fail(error);
                }
                fn on_complete(&self) {
                    self.shared.advance_slot(self.slot_index);
                }
            }
            input.subscribe(Rc::new(BranchObserver {
                shared: self.clone(),
                slot_index,
            }));
        }

        fn advance_slot(self: &Rc<Self>, slot_index: usize) {
            if *self.terminated.borrow() {
                return;
            }
            let next_input = self.pending_inputs.borrow_mut().pop_front();
            let mut remaining = self.remaining_total.borrow_mut();
            *remaining -= 1;
            let remaining_now = *remaining;
            drop(remaining);
            match next_input {
                Some(next) => {
                    self.slots.borrow_mut()[slot_index] = Slot {
                        queue: VecDeque::new(),
                        subscription: None,
                        done: false,
                    };
                    self.start_slot(slot_index, next);
                }
                None => {
                    self.slots.borrow_mut()[slot_index].done = true;
                    if remaining_now == 0 && !self.terminated.replace(true) {
                        self.downstream.on_complete();
                    }
                }
            }
        }

        fn fail(self: &Rc<Self>, error: SharedFlowError) {
            if self.terminated.replace(true) {
                return;
            }
            // Cancel, not dispose: these sibling inputs are still live, and
            // this is our own decision to stop them, not an external
            // dispose of any one of them.
            for slot in self.slots.borrow().iter() {
                if let Some(sub) = slot.subscription.as_ref() {
                    sub.cancel();
                }
            }
            self.downstream.on_error(error);
        }

        fn drain_downstream(self: &Rc<Self>) {
            if *self.terminated.borrow() {
                return;
            }
            let slot_count = self.slots.borrow().len();
            if slot_count == 0 {
                return;
            }
            loop {
                let start = self.cursor.borrow().min(slot_count.saturating_sub(1).max(0));
                let mut delivered_this_pass = false;
                for offset in 0..slot_count {
                    let index = (start + offset) % slot_count;
                    let item = self.slots.borrow_mut()[index].queue.pop_front();
                    if let Some(item) = item {
                        self.downstream.on_next(item);
                        if let Some(sub) = self.slots.borrow()[index].subscription.clone() {
                            sub.request(1);
                        }
                        *self.cursor.borrow_mut() = (index + 1) % slot_count;
                        delivered_this_pass = true;
                        break;
                    }
                }
                if !delivered_this_pass {
                    break;
                }
            }
        }
    }
    impl<T: 'static> Observable<T> for MergeObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            let mut inputs = self.inputs.borrow_mut().take().expect("merge observable subscribed twice");
            if inputs.is_empty() {
                let subscription = crate::subscription::NoopSubscription::new();
                observer.on_subscribe(subscription.clone());
                subscription.dispose();
                observer.on_complete();
                return;
            }
            let active_count = self.max_concurrent.min(inputs.len()).max(1);
            let rest: VecDeque<Obs<T>> = inputs.split_off(active_count).into();
            let total = active_count + rest.len();
            let shared = Rc::new(Shared {
                downstream: observer.clone(),
                slots: RefCell::new(
                    (0..active_count)
                        .map(|_| Slot { queue: VecDeque::new(), subscription: None, done: false })
                        .collect(),
                ),
                pending_inputs: RefCell::new(rest),
                remaining_total: RefCell::new(total),
                terminated: RefCell::new(false),
                cursor: RefCell::new(0),
                max_pending_per_input: self.max_pending_per_input.max(1),
            });

            struct MergeDownstreamSubscription<T> {
                shared: Rc<Shared<T>>,
                state: SimpleDisposable,
            }
            impl<T: 'static> Disposable for MergeDownstreamSubscription<T> {
                fn dispose(&self) {
                    self.state.dispose();
                    // Each slot's own subscription is a root subscription
                    // back to its branch observer, so disposing it cascades
                    // an `on_error(disposed)` down to `downstream` through
                    // `Shared::fail`.
                    for slot in self.shared.slots.borrow().iter() {
                        if let Some(sub) = slot.subscription.as_ref() {
                            sub.dispose();
                        }
                    }
                }
                fn cancel(&self) {
                    self.state.dispose();
                    for slot in self.shared.slots.borrow().iter() {
                        if let Some(sub) = slot.subscription.as_ref() {
                            sub.cancel();
                        }
                    }
                }
                fn is_disposed(&self) -> bool {
                    self.state.is_disposed()
                }
            }
            impl<T: 'static> Sealed for MergeDownstreamSubscription<T> {}
            impl<T: 'static> Subscription for MergeDownstreamSubscription<T> {
                fn request(&self, _n: u64) {
                    // Downstream demand is not separately metered: each
                    // active input is already capped at
                    // `max_pending_per_input`, and every arrival is
                    // forwarded as soon as it is dequeued in
                    // `drain_downstream`. `request` here exists so callers
                    // can `cancel()`/`dispose()` the merged stream.
                }
            }
            observer.on_subscribe(Rc::new(MergeDownstreamSubscription {
                shared: shared.clone(),
                state: SimpleDisposable::new(),
            }));
            for (index, input) in inputs.into_iter().enumerate() {
                shared.start_slot(index, input);
            }
        }
    }
    Rc::new(MergeObservable {
        inputs: RefCell::new(Some(inputs)),
        max_concurrent: config.merge_max_concurrent,
        max_pending_per_input: config.merge_max_pending_per_input as u64,
    })
}

/// `concat`: subscribes to inputs one at a time, in order, moving to the
/// next only after the current one completes. Fails (and stops) as soon as
/// any input fails.
pub fn concat<T: 'static>(inputs: Vec<Obs<T>>) -> Obs<T> {
    struct ConcatObservable<T> {
        inputs: Rc<Vec<Obs<T>>>,
    }
    struct ConcatState<T> {
        inputs: Rc<Vec<Obs<T>>>,
        downstream: Rc<dyn Observer<T>>,
        index: RefCell<usize>,
    }
    fn subscribe_next<T: 'static>(state: Rc<ConcatState<T>>) {
        let idx = *state.index.borrow();
        if idx >= state.inputs.len() {
            state.downstream.on_complete();
            return;
        }
        struct ConcatObserver<T> {
            state: Rc<ConcatState<T>>,
        }
        impl<T: 'static> Observer<T> for ConcatObserver<T> {
            fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                self.state.downstream.on_subscribe(subscription);
            }
            fn on_next(&self, item: T) {
                self.state.downstream.on_next(item);
            }
            fn on_error(&self, error: SharedFlowError) {
                self.state.downstream.on_error(error);
            }
            fn on_complete(&self) {
                *self.state.index.borrow_mut() += 1;
                subscribe_next(self.state.clone());
            }
        }
        let input = state.inputs[idx].clone();
        input.subscribe(Rc::new(ConcatObserver { state: state.clone() }));
    }
    impl<T: 'static> Observable<T> for ConcatObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            let state = Rc::new(ConcatState {
                inputs: self.inputs.clone(),
                downstream: observer,
                index: RefCell::new(0),
            });
            subscribe_next(state);
        }
    }
    Rc::new(ConcatObservable {
        inputs: Rc::new(inputs),
    })
}

/// `zip_with`: pairs the nth item of `left` with the nth item of `right`,
/// applying `f`, emitting one combined item per completed pair. Completes
/// as soon as either input completes and its buffered values are
/// exhausted.
pub fn zip_with<A: 'static, B: 'static, R: 'static>(
    left: Obs<A>,
    right: Obs<B>,
    f: impl Fn(A, B) -> R + 'static,
) -> Obs<R> {
    struct ZipObservable<A, B, F> {
        left: Obs<A>,
        right: Obs<B>,
        f: Rc<F>,
    }
    struct ZipState<A, B, R, F> {
        downstream: Rc<dyn Observer<R>>,
        left_buf: RefCell<std::collections::VecDeque<A>>,
        right_buf: RefCell<std::collections::VecDeque<B>>,
        left_done: RefCell<bool>,
        right_done: RefCell<bool>,
        terminated: RefCell<bool>,
        f: Rc<F>,
    }
    impl<A: 'static, B: 'static, R: 'static, F: Fn(A, B) -> R + 'static> ZipState<A, B, R, F> {
        fn try_emit(&self) {
            loop {
                let has_pair = !self.left_buf.borrow().is_empty() && !self.right_buf.borrow().is_empty();
                if !has_pair {
                    break;
                }
                let a = self.left_buf.borrow_mut().pop_front().expect("checked non-empty");
                let b = self.right_buf.borrow_mut().pop_front().expect("checked non-empty");
                self.downstream.on_next((self.f)(a, b));
            }
            let left_exhausted = *self.left_done.borrow() && self.left_buf.borrow().is_empty();
            let right_exhausted = *self.right_done.borrow() && self.right_buf.borrow().is_empty();
            if (left_exhausted || right_exhausted) && !self.terminated.replace(true) {
                self.downstream.on_complete();
            }
        }
    }
    impl<A: 'static, B: 'static, R: 'static, F: Fn(A, B) -> R + 'static> Observable<R> for ZipObservable<A, B, F> {
        fn subscribe(&self, observer: Rc<dyn Observer<R>>) {
            let state = Rc::new(ZipState {
                downstream: observer.clone(),
                left_buf: RefCell::new(std::collections::VecDeque::new()),
                right_buf: RefCell::new(std::collections::VecDeque::new()),
                left_done: RefCell::new(false),
                right_done: RefCell::new(false),
                terminated: RefCell::new(false),
                f: self.f.clone(),
            });
            let composite = Rc::new(CompositeDisposable::new());
            observer.on_subscribe(Rc::new(CompositeSubscription {
                inner: composite.clone(),
            }));

            struct LeftObserver<A, B, R, F> {
                state: Rc<ZipState<A, B, R, F>>,
            }
            impl<A: 'static, B: 'static, R: 'static, F: Fn(A, B) -> R + 'static> Observer<A> for LeftObserver<A, B, R, F> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    subscription.request(crate::demand::UNBOUNDED);
                }
                fn on_next(&self, item: A) {
                    self.state.left_buf.borrow_mut().push_back(item);
                    self.state.try_emit();
                }
                fn on_error(&self, error: SharedFlowError) {
                    if !self.state.terminated.replace(true) {
                        self.state.downstream.on_error(error);
                    }
                }
                fn on_complete(&self) {
                    *self.state.left_done.borrow_mut() = true;
                    self.state.try_emit();
                }
            }
            struct RightObserver<A, B, R, F> {
                state: Rc<ZipState<A, B, R, F>>,
            }
            impl<A: 'static, B: 'static, R: 'static, F: Fn(A, B) -> R + 'static> Observer<B> for RightObserver<A, B, R, F> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    subscription.request(crate::demand::UNBOUNDED);
                }
                fn on_next(&self, item: B) {
                    self.state.right_buf.borrow_mut().push_back(item);
                    self.state.try_emit();
                }
                fn on_error(&self, error: SharedFlowError) {
                    if !self.state.terminated.replace(true) {
                        self.state.downstream.on_error(error);
                    }
                }
                fn on_complete(&self) {
                    *self.state.right_done.borrow_mut() = true;
                    self.state.try_emit();
                }
            }
            self.left.subscribe(Rc::new(LeftObserver { state: state.clone() }));
            self.right.subscribe(Rc::new(RightObserver { state }));
        }
    }
    Rc::new(ZipObservable {
        left,
        right,
        f: Rc::new(f),
    })
}

struct CompositeSubscription {
    inner: Rc<CompositeDisposable>,
}
impl Disposable for CompositeSubscription {
    fn dispose(&self) {
        self.inner.dispose();
    }
    fn cancel(&self) {
        self.inner.cancel();
    }
    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}
impl Sealed for CompositeSubscription {}
impl Subscription for CompositeSubscription {
    fn request(&self, _n: u64) {}
}

/// `combine_latest`: emits a `Vec<T>` snapshot of every input's latest value
/// each time any input produces a new one, once all inputs have produced at
/// least one. Resolved against
/// `examples/original_source/libcaf_core/caf/detail/combine_latest.hpp`'s
/// `fail_if_completed_before_first_value`: an input that completes before
/// ever emitting fails the whole combination with
/// `cannot_combine_empty_observables`; an input that completes after
/// contributing at least one value simply stops contributing further
/// updates, and the combined observable only completes once every input has
/// reached a terminal event.
pub fn combine_latest<T: Clone + 'static>(inputs: Vec<Obs<T>>) -> Obs<Vec<T>> {
    struct CombineObservable<T> {
        inputs: Vec<Obs<T>>,
    }
    struct CombineState<T> {
        downstream: Rc<dyn Observer<Vec<T>>>,
        latest: RefCell<Vec<Option<T>>>,
        done: RefCell<Vec<bool>>,
        terminated: RefCell<bool>,
    }
    impl<T: Clone + 'static> CombineState<T> {
        fn all_present(&self) -> bool {
            self.latest.borrow().iter().all(|v| v.is_some())
        }
        fn all_done(&self) -> bool {
            self.done.borrow().iter().all(|d| *d)
        }
        /// Called from a fresh `on_next`: emits a new snapshot if every input
        /// has contributed at least one value, then checks for completion.
        fn emit_if_ready(&self) {
            if *self.terminated.borrow() {
                return;
            }
            if self.all_present() {
                let snapshot: Vec<T> = self.latest.borrow().iter().map(|v| v.clone().unwrap()).collect();
                self.downstream.on_next(snapshot);
            }
            self.complete_if_done();
        }

        /// Called from `on_complete`: an input finishing never produces a
        /// new snapshot on its own, it only narrows whether every input has
        /// now finished.
        fn complete_if_done(&self) {
            if self.all_done() && !self.terminated.replace(true) {
                self.downstream.on_complete();
            }
        }
        fn fail(&self, error: SharedFlowError) {
            if !self.terminated.replace(true) {
                self.downstream.on_error(error);
            }
        }
    }
    impl<T: Clone + 'static> Observable<Vec<T>> for CombineObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<Vec<T>>>) {
            if self.inputs.is_empty() {
                let subscription = crate::subscription::NoopSubscription::new();
                observer.on_subscribe(subscription.clone());
                subscription.dispose();
                observer.on_complete();
                return;
            }
            let count = self.inputs.len();
            let state = Rc::new(CombineState {
                downstream: observer.clone(),
                latest: RefCell::new(vec![None; count]),
                done: RefCell::new(vec![false; count]),
                terminated: RefCell::new(false),
            });
            let composite = Rc::new(CompositeDisposable::new());
            observer.on_subscribe(Rc::new(CompositeSubscription { inner: composite }));

            struct BranchObserver<T> {
                state: Rc<CombineState<T>>,
                index: usize,
            }
            impl<T: Clone + 'static> Observer<T> for BranchObserver<T> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    subscription.request(crate::demand::UNBOUNDED);
                }
                fn on_next(&self, item: T) {
                    self.state.latest.borrow_mut()[self.index] = Some(item);
                    self.state.emit_if_ready();
                }
                fn on_error(&self, error: SharedFlowError) {
                    self.state.fail(error);
                }
                fn on_complete(&self) {
                    let had_value = self.state.latest.borrow()[self.index].is_some();
                    if !had_value {
                        self.state.fail(crate::error::FlowError::cannot_combine_empty_observables().shared());
                        return;
                    }
                    self.state.done.borrow_mut()[self.index] = true;
                    self.state.complete_if_done();
                }
            }
            for (index, input) in self.inputs.iter().enumerate() {
                input.subscribe(Rc::new(BranchObserver {
                    state: state.clone(),
                    index,
                }));
            }
        }
    }
    Rc::new(CombineObservable { inputs })
}

/// `flat_map`: maps each upstream item to an inner `Obs<U>` via `f` and
/// merges every inner observable's output as it arrives (`merge`'s
/// arrival-order semantics, not `concat`'s sequencing). Completes once the
/// outer stream and every inner observable it spawned have completed; fails
/// immediately, cancelling every still-live inner observable, on the first
/// error from either the outer stream or an inner one. Matches spec.md
/// §6.2's `flat_map(f)`.
pub fn flat_map<T: 'static, U: 'static>(upstream: Obs<T>, f: impl Fn(T) -> Obs<U> + 'static) -> Obs<U> {
    struct FlatMapObservable<T, U, F> {
        upstream: Obs<T>,
        f: Rc<F>,
        _marker: std::marker::PhantomData<(T, U)>,
    }
    struct Shared<U> {
        downstream: Rc<dyn Observer<U>>,
        outer_done: RefCell<bool>,
        active: RefCell<usize>,
        terminated: RefCell<bool>,
        subs: Rc<CompositeDisposable>,
    }
    impl<U: 'static> Shared<U> {
        fn maybe_complete(&self) {
            if *self.outer_done.borrow() && *self.active.borrow() == 0 && !self.terminated.replace(true) {
                self.downstream.on_complete();
            }
        }
        fn fail(&self, error: SharedFlowError) {
            if !self.terminated.replace(true) {
                self.subs.cancel();
                self.downstream.on_error(error);
            }
        }
    }
    struct InnerObserver<U> {
        shared: Rc<Shared<U>>,
    }
    impl<U: 'static> Observer<U> for InnerObserver<U> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            self.shared.subs.add(subscription.clone());
            subscription.request(crate::demand::UNBOUNDED);
        }
        fn on_next(&self, item: U) {
            if !*self.shared.terminated.borrow() {
                self.shared.downstream.on_next(item);
            }
        }
        fn on_error(&self, error: SharedFlowError) {
            self.shared.fail(error);
        }
        fn on_complete(&self) {
            if *self.shared.terminated.borrow() {
                return;
            }
            *self.shared.active.borrow_mut() -= 1;
            self.shared.maybe_complete();
        }
    }
    struct OuterObserver<T, U, F> {
        shared: Rc<Shared<U>>,
        f: Rc<F>,
        _marker: std::marker::PhantomData<T>,
    }
    impl<T: 'static, U: 'static, F: Fn(T) -> Obs<U> + 'static> Observer<T> for OuterObserver<T, U, F> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            self.shared.subs.add(subscription.clone());
            subscription.request(crate::demand::UNBOUNDED);
        }
        fn on_next(&self, item: T) {
            if *self.shared.terminated.borrow() {
                return;
            }
            let inner = (self.f)(item);
            *self.shared.active.borrow_mut() += 1;
            inner.subscribe(Rc::new(InnerObserver { shared: self.shared.clone() }));
        }
        fn on_error(&self, error: SharedFlowError) {
            self.shared.fail(error);
        }
        fn on_complete(&self) {
            *self.shared.outer_done.borrow_mut() = true;
            self.shared.maybe_complete();
        }
    }
    impl<T: 'static, U: 'static, F: Fn(T) -> Obs<U> + 'static> Observable<U> for FlatMapObservable<T, U, F> {
        fn subscribe(&self, observer: Rc<dyn Observer<U>>) {
            let subs = Rc::new(CompositeDisposable::new());
            let shared = Rc::new(Shared {
                downstream: observer.clone(),
                outer_done: RefCell::new(false),
                active: RefCell::new(0),
                terminated: RefCell::new(false),
                subs: subs.clone(),
            });
            observer.on_subscribe(Rc::new(CompositeSubscription { inner: subs }));
            self.upstream.subscribe(Rc::new(OuterObserver {
                shared,
                f: self.f.clone(),
                _marker: std::marker::PhantomData,
            }));
        }
    }
    Rc::new(FlatMapObservable {
        upstream,
        f: Rc::new(f),
        _marker: std::marker::PhantomData,
    })
}

/// `concat_map`: like [`flat_map`], but inner observables are subscribed
/// one at a time, in outer-arrival order — the inner observable for item
/// `k+1` is not subscribed until the inner observable for item `k` has
/// completed. `flat_concat` (spec.md §4.4.3's meta-observable form of
/// `concat`) is `concat_map` with an identity mapping function.
pub fn concat_map<T: 'static, U: 'static>(upstream: Obs<T>, f: impl Fn(T) -> Obs<U> + 'static) -> Obs<U> {
    struct ConcatMapObservable<T, U, F> {
        upstream: Obs<T>,
        f: Rc<F>,
        _marker: std::marker::PhantomData<(T, U)>,
    }
    struct State<T, U, F> {
        downstream: Rc<dyn Observer<U>>,
        f: Rc<F>,
        queue: RefCell<VecDeque<T>>,
        outer_done: RefCell<bool>,
        active: RefCell<bool>,
        terminated: RefCell<bool>,
        subs: Rc<CompositeDisposable>,
    }
    fn subscribe_next<T: 'static, U: 'static, F: Fn(T) -> Obs<U> + 'static>(state: Rc<State<T, U, F>>) {
        if *state.terminated.borrow() || *state.active.borrow() {
            return;
        }
        let item = state.queue.borrow_mut().pop_front();
        let item = match item {
            Some(item) => item,
            None => {
                if *state.outer_done.borrow() && !state.terminated.replace(true) {
                    state.downstream.on_complete();
                }
                return;
            }
        };
        *state.active.borrow_mut() = true;
        struct InnerObserver<T, U, F> {
            state: Rc<State<T, U, F>>,
        }
        impl<T: 'static, U: 'static, F: Fn(T) -> Obs<U> + 'static> Observer<U> for InnerObserver<T, U, F> {
            fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                self.state.subs.add(subscription.clone());
                subscription.request(crate::demand::UNBOUNDED);
            }
            fn on_next(&self, item: U) {
                if !*self.state.terminated.borrow() {
                    self.state.downstream.on_next(item);
                }
            }
            fn on_error(&self, error: SharedFlowError) {
                if !self.state.terminated.replace(true) {
                    self.state.subs.cancel();
                    self.state.downstream.on_error(error);
                }
            }
            fn on_complete(&self) {
                if *self.state.terminated.borrow() {
                    return;
                }
                *self.state.active.borrow_mut() = false;
                subscribe_next(self.state.clone());
            }
        }
        let inner = (state.f)(item);
        inner.subscribe(Rc::new(InnerObserver { state }));
    }
    impl<T: 'static, U: 'static, F: Fn(T) -> Obs<U> + 'static> Observable<U> for ConcatMapObservable<T, U, F> {
        fn subscribe(&self, observer: Rc<dyn Observer<U>>) {
            let subs = Rc::new(CompositeDisposable::new());
            let state = Rc::new(State {
                downstream: observer.clone(),
                f: self.f.clone(),
                queue: RefCell::new(VecDeque::new()),
                outer_done: RefCell::new(false),
                active: RefCell::new(false),
                terminated: RefCell::new(false),
                subs: subs.clone(),
            });
            observer.on_subscribe(Rc::new(CompositeSubscription { inner: subs.clone() }));

            struct OuterObserver<T, U, F> {
                state: Rc<State<T, U, F>>,
            }
            impl<T: 'static, U: 'static, F: Fn(T) -> Obs<U> + 'static> Observer<T> for OuterObserver<T, U, F> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    self.state.subs.add(subscription.clone());
                    subscription.request(crate::demand::UNBOUNDED);
                }
                fn on_next(&self, item: T) {
                    if *self.state.terminated.borrow() {
                        return;
                    }
                    self.state.queue.borrow_mut().push_back(item);
                    subscribe_next(self.state.clone());
                }
                fn on_error(&self, error: SharedFlowError) {
                    if !self.state.terminated.replace(true) {
                        self.state.subs.cancel();
                        self.state.downstream.on_error(error);
                    }
                }
                fn on_complete(&self) {
                    *self.state.outer_done.borrow_mut() = true;
                    subscribe_next(self.state.clone());
                }
            }
            self.upstream.subscribe(Rc::new(OuterObserver { state: state.clone() }));
        }
    }
    Rc::new(ConcatMapObservable {
        upstream,
        f: Rc::new(f),
        _marker: std::marker::PhantomData,
    })
}

/// `flat_concat`: `concat`'s meta-observable form — an observable whose
/// items are themselves observables, concatenated in arrival order. Matches
/// spec.md §4.4.3's note that `concat` "supports ... a meta-observable
/// producing observables (flat_concat)".
pub fn flat_concat<T: 'static>(upstream: Obs<Obs<T>>) -> Obs<T> {
    concat_map(upstream, |inner| inner)
}
