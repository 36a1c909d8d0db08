//! Flow-control operators: `on_backpressure_buffer`, `buffer`,
//! `prefix_and_tail`, `on_error_resume_next`, `retry` — spec.md §4.4.2/§4.4.6.

use crate::disposable::{Disposable, SimpleDisposable};
use crate::error::SharedFlowError;
use crate::observable::{Obs, Observable};
use crate::observer::Observer;
use crate::sealed::Sealed;
use crate::subscription::Subscription;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// What `on_backpressure_buffer` does when the buffer is full and another
/// item arrives. Matches spec.md §4.4.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowStrategy {
    DropNewest,
    DropOldest,
    Fail,
}

/// A terminal event held back while the buffer still has items to drain,
/// per spec.md §4.4.2: downstream only sees it once the buffer is empty.
enum PendingTerminal {
    Error(SharedFlowError),
    Complete,
}

struct BackpressureBufferSubscription<T> {
    upstream: RefCell<Option<Rc<dyn Subscription>>>,
    buffer: Rc<RefCell<VecDeque<T>>>,
    downstream: Rc<dyn Observer<T>>,
    pending_terminal: Rc<RefCell<Option<PendingTerminal>>>,
    terminated: Rc<Cell<bool>>,
    state: SimpleDisposable,
}

impl<T: 'static> Disposable for BackpressureBufferSubscription<T> {
    fn dispose(&self) {
        self.state.dispose();
        if let Some(up) = self.upstream.borrow_mut().take() {
            up.dispose();
        }
    }
    fn cancel(&self) {
        self.state.dispose();
        if let Some(up) = self.upstream.borrow_mut().take() {
            up.cancel();
        }
    }
    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}
impl<T: 'static> Sealed for BackpressureBufferSubscription<T> {}
impl<T: 'static> Subscription for BackpressureBufferSubscription<T> {
    fn request(&self, n: u64) {
        if self.is_disposed() || self.terminated.get() {
            return;
        }
        let mut remaining = n;
        while remaining > 0 {
            let item = self.buffer.borrow_mut().pop_front();
            match item {
                Some(item) => {
                    self.downstream.on_next(item);
                    remaining -= 1;
                }
                None => break,
            }
        }
        if self.buffer.borrow().is_empty() {
            if let Some(terminal) = self.pending_terminal.borrow_mut().take() {
                self.terminated.set(true);
                match terminal {
                    PendingTerminal::Error(error) => self.downstream.on_error(error),
                    PendingTerminal::Complete => self.downstream.on_complete(),
                }
            }
        }
    }
}

/// Buffers upstream items that arrive ahead of downstream demand instead of
/// applying upstream-level backpressure, per spec.md §4.4.2. Upstream is
/// always requested unbounded; `strategy` decides what happens once
/// `capacity` buffered items are waiting and another arrives.
pub fn on_backpressure_buffer<T: 'static>(upstream: Obs<T>, capacity: usize, strategy: OverflowStrategy) -> Obs<T> {
    struct BufferingObservable<T> {
        upstream: Obs<T>,
        capacity: usize,
        strategy: OverflowStrategy,
    }
    struct BufferingObserver<T> {
        downstream: Rc<dyn Observer<T>>,
        buffer: Rc<RefCell<VecDeque<T>>>,
        capacity: usize,
        strategy: OverflowStrategy,
        subscription: RefCell<Option<Rc<BackpressureBufferSubscription<T>>>>,
        pending_terminal: Rc<RefCell<Option<PendingTerminal>>>,
        terminated: Rc<Cell<bool>>,
    }
    impl<T: 'static> Observer<T> for BufferingObserver<T> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            subscription.request(crate::demand::UNBOUNDED);
            let downstream_sub = Rc::new(BackpressureBufferSubscription {
                upstream: RefCell::new(Some(subscription)),
                buffer: self.buffer.clone(),
                downstream: self.downstream.clone(),
                pending_terminal: self.pending_terminal.clone(),
                terminated: self.terminated.clone(),
                state: SimpleDisposable::new(),
            });
            *self.subscription.borrow_mut() = Some(downstream_sub.clone());
            self.downstream.on_subscribe(downstream_sub);
        }
        fn on_next(&self, item: T) {
            let mut buffer = self.buffer.borrow_mut();
            if buffer.len() >= self.capacity {
                match self.strategy {
                    OverflowStrategy::DropNewest => return,
                    OverflowStrategy::DropOldest => {
                        buffer.pop_front();
                        buffer.push_back(item);
                    }
                    OverflowStrategy::Fail => {
                        drop(buffer);
                        self.buffer.borrow_mut().clear();
                        self.terminated.set(true);
                        if let Some(sub) = self.subscription.borrow().as_ref() {
                            sub.cancel();
                        }
                        self.downstream.on_error(crate::error::FlowError::backpressure_overflow().shared());
                    }
                }
            } else {
                buffer.push_back(item);
            }
        }
        fn on_error(&self, error: SharedFlowError) {
            if self.terminated.get() {
                return;
            }
            if self.buffer.borrow().is_empty() {
                self.terminated.set(true);
                self.downstream.on_error(error);
            } else {
                *self.pending_terminal.borrow_mut() = Some(PendingTerminal::Error(error));
            }
        }
        fn on_complete(&self) {
            if self.terminated.get() {
                return;
            }
            if self.buffer.borrow().is_empty() {
                self.terminated.set(true);
                self.downstream.on_complete();
            } else {
                *self.pending_terminal.borrow_mut() = Some(PendingTerminal::Complete);
            }
        }
    }
    impl<T: 'static> Observable<T> for BufferingObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            self.upstream.subscribe(Rc::new(BufferingObserver {
                downstream: observer,
                buffer: Rc::new(RefCell::new(VecDeque::new())),
                capacity: self.capacity,
                strategy: self.strategy,
                subscription: RefCell::new(None),
                pending_terminal: Rc::new(RefCell::new(None)),
                terminated: Rc::new(Cell::new(false)),
            }));
        }
    }
    Rc::new(BufferingObservable {
        upstream,
        capacity,
        strategy,
    })
}

/// Groups items into fixed-size `Vec<T>` chunks, flushing a final
/// undersized chunk on completion if any items remain.
pub fn buffer<T: 'static>(upstream: Obs<T>, count: usize) -> Obs<Vec<T>> {
    struct BufferObservable<T> {
        upstream: Obs<T>,
        count: usize,
    }
    struct BufferObserver<T> {
        downstream: Rc<dyn Observer<Vec<T>>>,
        count: usize,
        current: RefCell<Vec<T>>,
    }
    impl<T: 'static> Observer<T> for BufferObserver<T> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            self.downstream.on_subscribe(subscription);
        }
        fn on_next(&self, item: T) {
            let mut current = self.current.borrow_mut();
            current.push(item);
            if current.len() >= self.count {
                let batch = std::mem::take(&mut *current);
                drop(current);
                self.downstream.on_next(batch);
            }
        }
        fn on_error(&self, error: SharedFlowError) {
            self.downstream.on_error(error);
        }
        fn on_complete(&self) {
            let remaining = std::mem::take(&mut *self.current.borrow_mut());
            if !remaining.is_empty() {
                self.downstream.on_next(remaining);
            }
            self.downstream.on_complete();
        }
    }
    impl<T: 'static> Observable<Vec<T>> for BufferObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<Vec<T>>>) {
            self.upstream.subscribe(Rc::new(BufferObserver {
                downstream: observer,
                count: self.count,
                current: RefCell::new(Vec::with_capacity(self.count)),
            }));
        }
    }
    Rc::new(BufferObservable { upstream, count })
}

/// Splits the stream into a `prefix_len`-item prefix, delivered eagerly as
/// a `Vec<T>`, and a live tail `Obs<T>` carrying everything after it.
/// Delivered as a single combined `on_next` once the prefix has been
/// collected in full.
pub fn prefix_and_tail<T: 'static>(upstream: Obs<T>, prefix_len: usize) -> Obs<(Vec<T>, Obs<T>)> {
    struct PrefixObservable<T> {
        upstream: Obs<T>,
        prefix_len: usize,
    }
    impl<T: 'static> Observable<(Vec<T>, Obs<T>)> for PrefixObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<(Vec<T>, Obs<T>)>>) {
            let prefix = Rc::new(RefCell::new(Vec::with_capacity(self.prefix_len)));
            let tail_relay: Rc<RefCell<Option<Rc<dyn Observer<T>>>>> = Rc::new(RefCell::new(None));
            let upstream_sub: Rc<RefCell<Option<Rc<dyn Subscription>>>> = Rc::new(RefCell::new(None));
            let prefix_len = self.prefix_len;

            struct TailObservable<T> {
                relay: Rc<RefCell<Option<Rc<dyn Observer<T>>>>>,
                upstream_sub: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
            }
            impl<T: 'static> Observable<T> for TailObservable<T> {
                fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
                    *self.relay.borrow_mut() = Some(observer.clone());
                    if let Some(sub) = self.upstream_sub.borrow().as_ref() {
                        observer.on_subscribe(sub.clone());
                    }
                }
            }

            struct PrefixObserver<T> {
                downstream: Rc<dyn Observer<(Vec<T>, Obs<T>)>>,
                prefix: Rc<RefCell<Vec<T>>>,
                prefix_len: usize,
                tail_relay: Rc<RefCell<Option<Rc<dyn Observer<T>>>>>,
                upstream_sub: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
                delivered_prefix: RefCell<bool>,
            }
            impl<T: 'static> Observer<T> for PrefixObserver<T> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    *self.upstream_sub.borrow_mut() = Some(subscription.clone());
                    self.downstream.on_subscribe(subscription);
                }
                fn on_next(&self, item: T) {
                    if !*self.delivered_prefix.borrow() {
                        self.prefix.borrow_mut().push(item);
                        if self.prefix.borrow().len() >= self.prefix_len {
                            *self.delivered_prefix.borrow_mut() = true;
                            let collected = std::mem::take(&mut *self.prefix.borrow_mut());
                            let tail: Obs<T> = Rc::new(TailObservable {
                                relay: self.tail_relay.clone(),
                                upstream_sub: self.upstream_sub.clone(),
                            });
                            self.downstream.on_next((collected, tail));
                        }
                        return;
                    }
                    if let Some(relay) = self.tail_relay.borrow().as_ref() {
                        relay.on_next(item);
                    }
                }
                fn on_error(&self, error: SharedFlowError) {
                    if let Some(relay) = self.tail_relay.borrow().as_ref() {
                        relay.on_error(error);
                    } else {
                        self.downstream.on_error(error);
                    }
                }
                fn on_complete(&self) {
                    if *self.delivered_prefix.borrow() {
                        if let Some(relay) = self.tail_relay.borrow().as_ref() {
                            relay.on_complete();
                        }
                    } else {
                        // Upstream completed with fewer than `prefix_len`
                        // items: per spec.md §4.4.5, no tuple is produced at
                        // all, just a plain completion.
                        self.downstream.on_complete();
                    }
                }
            }
            self.upstream.subscribe(Rc::new(PrefixObserver {
                downstream: observer,
                prefix: prefix.clone(),
                prefix_len,
                tail_relay: tail_relay.clone(),
                upstream_sub: upstream_sub.clone(),
                delivered_prefix: RefCell::new(false),
            }));
        }
    }
    Rc::new(PrefixObservable { upstream, prefix_len })
}

/// `head_and_tail`: `prefix_and_tail(1)` with the single-element prefix
/// unwrapped to a bare head value, matching spec.md §4.4.5's naming. If the
/// source completes with no items at all, no head/tail pair is ever
/// emitted (mirroring `prefix_and_tail`'s "fewer than `n` items" case).
pub fn head_and_tail<T: 'static>(upstream: Obs<T>) -> Obs<(T, Obs<T>)> {
    let paired = prefix_and_tail(upstream, 1);
    crate::step::map(paired, |(mut prefix, tail)| {
        let head = prefix.pop().expect("prefix_and_tail(1) only emits once it has 1 item");
        (head, tail)
    })
}

/// On an upstream error matching `predicate`, subscribes `fallback` instead
/// of forwarding it downstream, transferring the downstream observer to the
/// fallback's own subscription; a non-matching error is forwarded as-is.
/// Matches spec.md §4.4.6's `on_error_resume_next(predicate, fallback)`.
pub fn on_error_resume_next<T: 'static>(
    upstream: Obs<T>,
    predicate: impl Fn(&SharedFlowError) -> bool + 'static,
    fallback: Obs<T>,
) -> Obs<T> {
    struct ResumeObservable<T, P> {
        upstream: Obs<T>,
        predicate: Rc<P>,
        fallback: Obs<T>,
    }
    struct ResumeState<T> {
        downstream: Rc<dyn Observer<T>>,
        current_sub: RefCell<Option<Rc<dyn Subscription>>>,
        proxy_disposed: SimpleDisposable,
        // Whether `downstream` has already received a genuine terminal
        // event, so an external `dispose` after the stream has already
        // ended doesn't deliver a second one.
        terminated: Cell<bool>,
        // Demand requested by `downstream` but not yet fulfilled by
        // `on_next`, preserved across the swap onto the fallback's
        // subscription per spec.md §4.4.6.
        outstanding_demand: Cell<u64>,
    }
    // Hands `downstream` a single stable subscription object for the whole
    // chain's lifetime, even though the underlying subscription is swapped
    // out once resumed — `on_subscribe` must fire exactly once per
    // spec.md §4.2.
    struct ResumeSubscription<T> {
        state: Rc<ResumeState<T>>,
    }
    impl<T: 'static> Disposable for ResumeSubscription<T> {
        fn dispose(&self) {
            if self.state.proxy_disposed.is_disposed() {
                return;
            }
            self.state.proxy_disposed.dispose();
            if let Some(sub) = self.state.current_sub.borrow().as_ref() {
                sub.cancel();
            }
            if !self.state.terminated.replace(true) {
                self.state.downstream.on_error(crate::error::FlowError::disposed().shared());
            }
        }
        fn cancel(&self) {
            if self.state.proxy_disposed.is_disposed() {
                return;
            }
            self.state.proxy_disposed.dispose();
            self.state.terminated.set(true);
            if let Some(sub) = self.state.current_sub.borrow().as_ref() {
                sub.cancel();
            }
        }
        fn is_disposed(&self) -> bool {
            self.state.proxy_disposed.is_disposed()
        }
    }
    impl<T: 'static> Sealed for ResumeSubscription<T> {}
    impl<T: 'static> Subscription for ResumeSubscription<T> {
        fn request(&self, n: u64) {
            if self.is_disposed() || n == 0 {
                return;
            }
            self.state.outstanding_demand.set(self.state.outstanding_demand.get().saturating_add(n));
            if let Some(sub) = self.state.current_sub.borrow().as_ref() {
                sub.request(n);
            }
        }
    }
    // Used only for the fallback subscription: the proxy handed to
    // `downstream` already exists from the primary subscribe, so this
    // observer just swaps `current_sub` without a second `on_subscribe`,
    // re-requesting whatever demand is still outstanding.
    struct ResumeObserver<T> {
        state: Rc<ResumeState<T>>,
    }
    impl<T: 'static> Observer<T> for ResumeObserver<T> {
        fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
            let pending = self.state.outstanding_demand.get();
            *self.state.current_sub.borrow_mut() = Some(subscription.clone());
            if pending > 0 {
                subscription.request(pending);
            }
        }
        fn on_next(&self, item: T) {
            self.state
                .outstanding_demand
                .set(self.state.outstanding_demand.get().saturating_sub(1));
            self.state.downstream.on_next(item);
        }
        fn on_error(&self, error: SharedFlowError) {
            self.state.terminated.set(true);
            self.state.downstream.on_error(error);
        }
        fn on_complete(&self) {
            self.state.terminated.set(true);
            self.state.downstream.on_complete();
        }
    }
    impl<T: 'static, P: Fn(&SharedFlowError) -> bool + 'static> Observable<T> for ResumeObservable<T, P> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            let state = Rc::new(ResumeState {
                downstream: observer,
                current_sub: RefCell::new(None),
                proxy_disposed: SimpleDisposable::new(),
                terminated: Cell::new(false),
                outstanding_demand: Cell::new(0),
            });
            let predicate = self.predicate.clone();
            let fallback = self.fallback.clone();
            struct PrimaryObserver<T, P> {
                state: Rc<ResumeState<T>>,
                predicate: Rc<P>,
                fallback: Obs<T>,
            }
            impl<T: 'static, P: Fn(&SharedFlowError) -> bool + 'static> Observer<T> for PrimaryObserver<T, P> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    *self.state.current_sub.borrow_mut() = Some(subscription);
                    self.state
                        .downstream
                        .on_subscribe(Rc::new(ResumeSubscription { state: self.state.clone() }));
                }
                fn on_next(&self, item: T) {
                    self.state
                        .outstanding_demand
                        .set(self.state.outstanding_demand.get().saturating_sub(1));
                    self.state.downstream.on_next(item);
                }
                fn on_error(&self, error: SharedFlowError) {
                    if self.state.proxy_disposed.is_disposed() {
                        return;
                    }
                    if (self.predicate)(&error) {
                        self.fallback.subscribe(Rc::new(ResumeObserver { state: self.state.clone() }));
                    } else {
                        self.state.terminated.set(true);
                        self.state.downstream.on_error(error);
                    }
                }
                fn on_complete(&self) {
                    self.state.terminated.set(true);
                    self.state.downstream.on_complete();
                }
            }
            self.upstream.subscribe(Rc::new(PrimaryObserver {
                state,
                predicate,
                fallback,
            }));
        }
    }
    Rc::new(ResumeObservable {
        upstream,
        predicate: Rc::new(predicate),
        fallback,
    })
}

/// Resubscribes to `upstream`, with the remaining demand preserved, as long
/// as each successive error satisfies `predicate`; a non-matching error (or
/// a matching one with no demand preserved) is forwarded downstream as-is.
/// Matches spec.md §4.4.6's `retry(predicate)` — unlike a bounded attempt
/// counter, this retries indefinitely while `predicate` keeps holding.
pub fn retry<T: 'static>(upstream: Obs<T>, predicate: impl Fn(&SharedFlowError) -> bool + 'static) -> Obs<T> {
    struct RetryObservable<T, P> {
        upstream: Obs<T>,
        predicate: Rc<P>,
    }
    struct RetryState<T, P> {
        upstream: Obs<T>,
        downstream: Rc<dyn Observer<T>>,
        predicate: Rc<P>,
        // The proxy subscription handed to `downstream` exactly once;
        // each retry attempt swaps in its own upstream subscription here
        // so `request`/`dispose` keep working without a second
        // `on_subscribe` call, which the protocol forbids.
        current_sub: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
        proxy_disposed: Rc<crate::disposable::SimpleDisposable>,
        // Set once `downstream` has received a genuine terminal event, so
        // an external dispose afterward doesn't deliver a second one.
        terminated: Rc<Cell<bool>>,
        // Demand requested by `downstream` but not yet fulfilled, preserved
        // across resubscription per spec.md §4.4.6.
        outstanding_demand: Rc<Cell<u64>>,
    }
    struct RetrySubscription<T, P> {
        state: Rc<RetryState<T, P>>,
    }
    impl<T: 'static, P> Disposable for RetrySubscription<T, P> {
        fn dispose(&self) {
            if self.state.proxy_disposed.is_disposed() {
                return;
            }
            self.state.proxy_disposed.dispose();
            if let Some(sub) = self.state.current_sub.borrow().as_ref() {
                sub.cancel();
            }
            if !self.state.terminated.replace(true) {
                self.state.downstream.on_error(crate::error::FlowError::disposed().shared());
            }
        }
        fn cancel(&self) {
            if self.state.proxy_disposed.is_disposed() {
                return;
            }
            self.state.proxy_disposed.dispose();
            self.state.terminated.set(true);
            if let Some(sub) = self.state.current_sub.borrow().as_ref() {
                sub.cancel();
            }
        }
        fn is_disposed(&self) -> bool {
            self.state.proxy_disposed.is_disposed()
        }
    }
    impl<T: 'static, P> Sealed for RetrySubscription<T, P> {}
    impl<T: 'static, P> Subscription for RetrySubscription<T, P> {
        fn request(&self, n: u64) {
            if self.is_disposed() || n == 0 {
                return;
            }
            self.state.outstanding_demand.set(self.state.outstanding_demand.get().saturating_add(n));
            if let Some(sub) = self.state.current_sub.borrow().as_ref() {
                sub.request(n);
            }
        }
    }
    fn attempt<T: 'static, P: Fn(&SharedFlowError) -> bool + 'static>(state: Rc<RetryState<T, P>>, first: bool) {
        struct RetryObserver<T, P> {
            state: Rc<RetryState<T, P>>,
            first: Cell<bool>,
        }
        impl<T: 'static, P: Fn(&SharedFlowError) -> bool + 'static> Observer<T> for RetryObserver<T, P> {
            fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                *self.state.current_sub.borrow_mut() = Some(subscription.clone());
                if self.first.get() {
                    self.state.downstream.on_subscribe(Rc::new(RetrySubscription {
                        state: self.state.clone(),
                    }));
                } else {
                    let pending = self.state.outstanding_demand.get();
                    if pending > 0 {
                        subscription.request(pending);
                    }
                }
            }
            fn on_next(&self, item: T) {
                self.state
                    .outstanding_demand
                    .set(self.state.outstanding_demand.get().saturating_sub(1));
                self.state.downstream.on_next(item);
            }
            fn on_error(&self, error: SharedFlowError) {
                if self.state.proxy_disposed.is_disposed() {
                    return;
                }
                if (self.state.predicate)(&error) {
                    attempt(self.state.clone(), false);
                } else {
                    self.state.terminated.set(true);
                    self.state.downstream.on_error(error);
                }
            }
            fn on_complete(&self) {
                self.state.terminated.set(true);
                self.state.downstream.on_complete();
            }
        }
        let upstream = state.upstream.clone();
        upstream.subscribe(Rc::new(RetryObserver { state, first: Cell::new(first) }));
    }
    impl<T: 'static, P: Fn(&SharedFlowError) -> bool + 'static> Observable<T> for RetryObservable<T, P> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            let state = Rc::new(RetryState {
                upstream: self.upstream.clone(),
                downstream: observer,
                predicate: self.predicate.clone(),
                current_sub: Rc::new(RefCell::new(None)),
                proxy_disposed: Rc::new(crate::disposable::SimpleDisposable::new()),
                terminated: Rc::new(Cell::new(false)),
                outstanding_demand: Rc::new(Cell::new(0)),
            });
            attempt(state, true);
        }
    }
    Rc::new(RetryObservable {
        upstream,
        predicate: Rc::new(predicate),
    })
}
