//! Distribution operators: the hot/multicast family — `ucast`, `mcast`,
//! `Multicaster`, `publish`/`Connectable`, `auto_connect`, `ref_count`,
//! `cache`, `replay`, `cell` — spec.md §4.4.4.
//!
//! Grounded on `examples/original_source/libcaf_core/caf/flow/op/ucast.hpp`
//! for the single-subscriber push primitive (`ucast`) and its corrected
//! abort/dispose ordering (see `SPEC_FULL.md` §7, resolved Open Question):
//! the original always emits `on_complete` on dispose even after `abort()`
//! recorded an error; here, a recorded error takes priority and is emitted
//! instead.

use crate::disposable::{Disposable, SimpleDisposable};
use crate::error::{FlowError, SharedFlowError};
use crate::observable::{Connectable, Obs, Observable};
use crate::observer::Observer;
use crate::sealed::Sealed;
use crate::subscription::Subscription;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Clone)]
enum Terminal {
    Error(SharedFlowError),
    Complete,
}

/// Shared fan-out core used by every hot operator in this module: holds the
/// currently-registered observers, an optional bounded replay buffer, and
/// whatever terminal event has already occurred (so a late subscriber is
/// replayed it instead of being left hanging).
struct Multicaster<T> {
    observers: crate::util::CowVector<Rc<dyn Observer<T>>>,
    replay_buffer: RefCell<VecDeque<T>>,
    replay_capacity: usize,
    terminal: RefCell<Option<Terminal>>,
}

impl<T: Clone + 'static> Multicaster<T> {
    fn new(replay_capacity: usize) -> Rc<Self> {
        Self::new_with_prealloc(replay_capacity, 0)
    }

    /// Like [`Multicaster::new`], but pre-reserves `prealloc` slots in the
    /// replay buffer up front — used by `cache`, whose history is unbounded
    /// and otherwise grows by repeated reallocation.
    fn new_with_prealloc(replay_capacity: usize, prealloc: usize) -> Rc<Self> {
        Rc::new(Self {
            observers: crate::util::CowVector::new(),
            replay_buffer: RefCell::new(VecDeque::with_capacity(prealloc)),
            replay_capacity,
            terminal: RefCell::new(None),
        })
    }

    /// Registers `observer`, replaying buffered history (if any) and
    /// whatever terminal event already fired.
    fn register(&self, observer: Rc<dyn Observer<T>>) {
        for item in self.replay_buffer.borrow().iter() {
            observer.on_next(item.clone());
        }
        match self.terminal.borrow().as_ref() {
            Some(Terminal::Error(err)) => {
                observer.on_error(err.clone());
                return;
            }
            Some(Terminal::Complete) => {
                observer.on_complete();
                return;
            }
            None => {}
        }
        self.observers.push(observer);
    }

    fn unregister(&self, observer: &Rc<dyn Observer<T>>) {
        self.observers.retain(|o| !Rc::ptr_eq(o, observer));
    }

    /// Dispatches against a snapshot of the observer list, so a downstream
    /// observer that subscribes or cancels from inside its own `on_next`
    /// doesn't reenter `register`/`unregister` while we're still iterating.
    fn dispatch_next(&self, item: T) {
        if self.terminal.borrow().is_some() {
            return;
        }
        if self.replay_capacity > 0 {
            let mut buf = self.replay_buffer.borrow_mut();
            if buf.len() >= self.replay_capacity {
                buf.pop_front();
            }
            buf.push_back(item.clone());
        }
        for observer in self.observers.snapshot().iter() {
            observer.on_next(item.clone());
        }
    }

    fn dispatch_error(&self, error: SharedFlowError) {
        if self.terminal.borrow().is_some() {
            return;
        }
        *self.terminal.borrow_mut() = Some(Terminal::Error(error.clone()));
        let observers = self.observers.snapshot();
        self.observers.retain(|_| false);
        for observer in observers.iter() {
            observer.on_error(error.clone());
        }
    }

    fn dispatch_complete(&self) {
        if self.terminal.borrow().is_some() {
            return;
        }
        *self.terminal.borrow_mut() = Some(Terminal::Complete);
        let observers = self.observers.snapshot();
        self.observers.retain(|_| false);
        for observer in observers.iter() {
            observer.on_complete();
        }
    }
}

/// Wraps a registered observer so [`UnregisterOnDispose`] can tell whether
/// the hub already delivered a terminal event before an external `dispose`
/// tries to deliver a second one (`on_error(disposed)`), per spec.md §7.
struct TerminalTrackingObserver<T> {
    inner: Rc<dyn Observer<T>>,
    terminated: Rc<Cell<bool>>,
}
impl<T: 'static> Observer<T> for TerminalTrackingObserver<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        self.inner.on_subscribe(subscription);
    }
    fn on_next(&self, item: T) {
        self.inner.on_next(item);
    }
    fn on_error(&self, error: SharedFlowError) {
        self.terminated.set(true);
        self.inner.on_error(error);
    }
    fn on_complete(&self) {
        self.terminated.set(true);
        self.inner.on_complete();
    }
}

struct UnregisterOnDispose<T> {
    hub: Rc<Multicaster<T>>,
    registered: Rc<dyn Observer<T>>,
    downstream: Rc<dyn Observer<T>>,
    terminated: Rc<Cell<bool>>,
    state: SimpleDisposable,
}
impl<T: Clone + 'static> Disposable for UnregisterOnDispose<T> {
    fn dispose(&self) {
        if self.state.is_disposed() {
            return;
        }
        self.state.dispose();
        self.hub.unregister(&self.registered);
        if !self.terminated.replace(true) {
            self.downstream.on_error(FlowError::disposed().shared());
        }
    }
    fn cancel(&self) {
        if self.state.is_disposed() {
            return;
        }
        self.state.dispose();
        self.terminated.set(true);
        self.hub.unregister(&self.registered);
    }
    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}
impl<T: Clone + 'static> Sealed for UnregisterOnDispose<T> {}
impl<T: Clone + 'static> Subscription for UnregisterOnDispose<T> {
    fn request(&self, _n: u64) {
        // Hot sources push regardless of demand; nothing to forward.
    }
}

/// A push handle into a hot source created by [`mcast`]/[`ucast`]: feed
/// values in imperatively rather than deriving them from an upstream
/// `Observable`.
pub struct PushHandle<T> {
    hub: Rc<Multicaster<T>>,
    aborted: RefCell<Option<SharedFlowError>>,
    state: SimpleDisposable,
}

impl<T: Clone + 'static> PushHandle<T> {
    pub fn push(&self, item: T) {
        if self.state.is_disposed() {
            return;
        }
        self.hub.dispatch_next(item);
    }

    pub fn complete(&self) {
        if self.state.is_disposed() {
            return;
        }
        self.state.dispose();
        self.hub.dispatch_complete();
    }

    /// Records a terminal error without emitting it yet — matches the
    /// CAF original's two-step `abort` then `dispose`.
    pub fn abort(&self, error: SharedFlowError) {
        *self.aborted.borrow_mut() = Some(error);
    }
}

impl<T: Clone + 'static> Disposable for PushHandle<T> {
    /// Disposing after `abort()` emits the recorded error; disposing
    /// without a prior `abort()` emits a plain completion. This is the
    /// corrected ordering relative to the CAF original (see module docs).
    fn dispose(&self) {
        if self.state.is_disposed() {
            return;
        }
        self.state.dispose();
        match self.aborted.borrow_mut().take() {
            Some(error) => self.hub.dispatch_error(error),
            None => self.hub.dispatch_complete(),
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}

struct PushObservable<T> {
    hub: Rc<Multicaster<T>>,
    single_subscriber: bool,
    claimed: Cell<bool>,
}

impl<T: Clone + 'static> Observable<T> for PushObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        if self.single_subscriber && self.claimed.replace(true) {
            let subscription = crate::subscription::NoopSubscription::new();
            observer.on_subscribe(subscription.clone());
            subscription.dispose();
            observer.on_error(FlowError::too_many_observers().shared());
            return;
        }
        let terminated = Rc::new(Cell::new(false));
        let tracked: Rc<dyn Observer<T>> = Rc::new(TerminalTrackingObserver {
            inner: observer.clone(),
            terminated: terminated.clone(),
        });
        let subscription = Rc::new(UnregisterOnDispose {
            hub: self.hub.clone(),
            registered: tracked.clone(),
            downstream: observer.clone(),
            terminated,
            state: SimpleDisposable::new(),
        });
        observer.on_subscribe(subscription);
        self.hub.register(tracked);
    }
}

/// `ucast`: a hot source that rejects a second subscriber with
/// `too_many_observers`, matching spec.md §6.2's unicast-source contract.
pub fn ucast<T: Clone + 'static>() -> (Rc<PushHandle<T>>, Obs<T>) {
    let hub = Multicaster::new(0);
    let handle = Rc::new(PushHandle {
        hub: hub.clone(),
        aborted: RefCell::new(None),
        state: SimpleDisposable::new(),
    });
    let observable: Obs<T> = Rc::new(PushObservable {
        hub,
        single_subscriber: true,
        claimed: Cell::new(false),
    });
    (handle, observable)
}

/// `mcast`: a hot source any number of observers may subscribe to; each
/// only sees items pushed after it subscribes.
pub fn mcast<T: Clone + 'static>() -> (Rc<PushHandle<T>>, Obs<T>) {
    let hub = Multicaster::new(0);
    let handle = Rc::new(PushHandle {
        hub: hub.clone(),
        aborted: RefCell::new(None),
        state: SimpleDisposable::new(),
    });
    let observable: Obs<T> = Rc::new(PushObservable {
        hub,
        single_subscriber: false,
        claimed: Cell::new(false),
    });
    (handle, observable)
}

struct ConnectableObservable<T> {
    upstream: Obs<T>,
    hub: Rc<Multicaster<T>>,
    connected: SimpleDisposable,
    upstream_sub: RefCell<Option<Rc<dyn Subscription>>>,
}

struct HubFeedObserver<T> {
    hub: Rc<Multicaster<T>>,
}
impl<T: Clone + 'static> Observer<T> for HubFeedObserver<T> {
    fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
        subscription.request(crate::demand::UNBOUNDED);
    }
    fn on_next(&self, item: T) {
        self.hub.dispatch_next(item);
    }
    fn on_error(&self, error: SharedFlowError) {
        self.hub.dispatch_error(error);
    }
    fn on_complete(&self) {
        self.hub.dispatch_complete();
    }
}

impl<T: Clone + 'static> Observable<T> for ConnectableObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        let terminated = Rc::new(Cell::new(false));
        let tracked: Rc<dyn Observer<T>> = Rc::new(TerminalTrackingObserver {
            inner: observer.clone(),
            terminated: terminated.clone(),
        });
        let subscription = Rc::new(UnregisterOnDispose {
            hub: self.hub.clone(),
            registered: tracked.clone(),
            downstream: observer.clone(),
            terminated,
            state: SimpleDisposable::new(),
        });
        observer.on_subscribe(subscription);
        self.hub.register(tracked);
    }
}

struct ConnectSubscription {
    inner: RefCell<Option<Rc<dyn Subscription>>>,
}
impl Disposable for ConnectSubscription {
    fn dispose(&self) {
        if let Some(sub) = self.inner.borrow_mut().take() {
            sub.dispose();
        }
    }
    fn cancel(&self) {
        if let Some(sub) = self.inner.borrow_mut().take() {
            sub.cancel();
        }
    }
    fn is_disposed(&self) -> bool {
        self.inner.borrow().as_ref().map(|s| s.is_disposed()).unwrap_or(true)
    }
}
impl Sealed for ConnectSubscription {}
impl Subscription for ConnectSubscription {
    fn request(&self, _n: u64) {}
}

impl<T: Clone + 'static> Connectable<T> for ConnectableObservable<T> {
    fn connect(&self) -> Rc<dyn Subscription> {
        if !self.connected.is_disposed() {
            self.connected.dispose();
            let feeder: Rc<dyn Observer<T>> = Rc::new(HubFeedObserver { hub: self.hub.clone() });
            // `subscribe` here is the upstream's, which hands back a
            // subscription via `on_subscribe`; capture it through the
            // feeder's own on_subscribe by routing through a side channel.
            let captured: Rc<RefCell<Option<Rc<dyn Subscription>>>> = Rc::new(RefCell::new(None));
            struct CapturingObserver<T> {
                inner: Rc<dyn Observer<T>>,
                captured: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
            }
            impl<T> Observer<T> for CapturingObserver<T> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    *self.captured.borrow_mut() = Some(subscription.clone());
                    self.inner.on_subscribe(subscription);
                }
                fn on_next(&self, item: T) {
                    self.inner.on_next(item);
                }
                fn on_error(&self, error: SharedFlowError) {
                    self.inner.on_error(error);
                }
                fn on_complete(&self) {
                    self.inner.on_complete();
                }
            }
            self.upstream.subscribe(Rc::new(CapturingObserver {
                inner: feeder,
                captured: captured.clone(),
            }));
            *self.upstream_sub.borrow_mut() = captured.borrow_mut().take();
        }
        Rc::new(ConnectSubscription {
            inner: RefCell::new(self.upstream_sub.borrow().clone()),
        })
    }
}
impl<T> Sealed for ConnectableObservable<T> {}

/// `publish`: wraps `upstream` in a [`Connectable`] that only starts
/// forwarding once [`Connectable::connect`] is called, per spec.md §4.4.4.
pub fn publish<T: Clone + 'static>(upstream: Obs<T>, coordinator: Rc<crate::coordinator::Coordinator>) -> Rc<dyn Connectable<T>> {
    coordinator.observability().debug("publish", "connectable created");
    Rc::new(ConnectableObservable {
        upstream,
        hub: Multicaster::new(0),
        connected: SimpleDisposable::new(),
        upstream_sub: RefCell::new(None),
    })
}

/// `auto_connect`: like `publish`, but connects automatically the moment
/// `min_subscribers` observers have subscribed, rather than requiring an
/// explicit `connect()` call.
pub fn auto_connect<T: Clone + 'static>(
    upstream: Obs<T>,
    coordinator: Rc<crate::coordinator::Coordinator>,
    min_subscribers: usize,
) -> Obs<T> {
    struct AutoConnectObservable<T> {
        connectable: Rc<dyn Connectable<T>>,
        coordinator: Rc<crate::coordinator::Coordinator>,
        count: Rc<Cell<usize>>,
        min_subscribers: usize,
    }
    impl<T: Clone + 'static> Observable<T> for AutoConnectObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            self.connectable.subscribe(observer);
            self.count.set(self.count.get() + 1);
            if self.count.get() >= self.min_subscribers {
                self.coordinator.observability().debug("auto_connect", "subscriber threshold reached, connecting");
                self.connectable.connect();
            }
        }
    }
    let connectable = publish(upstream, coordinator.clone());
    Rc::new(AutoConnectObservable {
        connectable,
        coordinator,
        count: Rc::new(Cell::new(0)),
        min_subscribers: min_subscribers.max(1),
    })
}

/// `ref_count`: connects on the first subscriber and disconnects (disposing
/// the upstream subscription) once the last subscriber unsubscribes,
/// matching spec.md §4.4.4's reference-counted sharing.
pub fn ref_count<T: Clone + 'static>(upstream: Obs<T>, coordinator: Rc<crate::coordinator::Coordinator>) -> Obs<T> {
    struct RefCountSubscription<T> {
        inner: Rc<dyn Subscription>,
        coordinator: Rc<crate::coordinator::Coordinator>,
        count: Rc<Cell<usize>>,
        connection: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
        state: SimpleDisposable,
        _marker: std::marker::PhantomData<T>,
    }
    impl<T> Disposable for RefCountSubscription<T> {
        fn dispose(&self) {
            if self.state.is_disposed() {
                return;
            }
            self.state.dispose();
            self.inner.dispose();
            let remaining = self.count.get().saturating_sub(1);
            self.count.set(remaining);
            if remaining == 0 {
                if let Some(conn) = self.connection.borrow_mut().take() {
                    self.coordinator.observability().debug("ref_count", "last subscriber gone, disconnecting");
                    // Cancelled, not disposed: the upstream feed into the
                    // hub has no subscriber left to notify, and disposing it
                    // would permanently latch the hub's terminal state to
                    // `disposed`, poisoning replay for a future first
                    // subscriber that reconnects.
                    conn.cancel();
                }
            }
        }
        fn cancel(&self) {
            if self.state.is_disposed() {
                return;
            }
            self.state.dispose();
            self.inner.cancel();
            let remaining = self.count.get().saturating_sub(1);
            self.count.set(remaining);
            if remaining == 0 {
                if let Some(conn) = self.connection.borrow_mut().take() {
                    self.coordinator.observability().debug("ref_count", "last subscriber gone, disconnecting");
                    conn.cancel();
                }
            }
        }
        fn is_disposed(&self) -> bool {
            self.state.is_disposed()
        }
    }
    impl<T> Sealed for RefCountSubscription<T> {}
    impl<T: 'static> Subscription for RefCountSubscription<T> {
        fn request(&self, n: u64) {
            self.inner.request(n);
        }
    }

    struct RefCountObservable<T> {
        connectable: Rc<dyn Connectable<T>>,
        coordinator: Rc<crate::coordinator::Coordinator>,
        count: Rc<Cell<usize>>,
        connection: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
    }
    impl<T: Clone + 'static> Observable<T> for RefCountObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            struct WrapObserver<T> {
                inner: Rc<dyn Observer<T>>,
                coordinator: Rc<crate::coordinator::Coordinator>,
                count: Rc<Cell<usize>>,
                connection: Rc<RefCell<Option<Rc<dyn Subscription>>>>,
            }
            impl<T: 'static> Observer<T> for WrapObserver<T> {
                fn on_subscribe(&self, subscription: Rc<dyn Subscription>) {
                    self.inner.on_subscribe(Rc::new(RefCountSubscription {
                        inner: subscription,
                        coordinator: self.coordinator.clone(),
                        count: self.count.clone(),
                        connection: self.connection.clone(),
                        state: SimpleDisposable::new(),
                        _marker: std::marker::PhantomData,
                    }));
                }
                fn on_next(&self, item: T) {
                    self.inner.on_next(item);
                }
                fn on_error(&self, error: SharedFlowError) {
                    self.inner.on_error(error);
                }
                fn on_complete(&self) {
                    self.inner.on_complete();
                }
            }
            self.connectable.subscribe(Rc::new(WrapObserver {
                inner: observer,
                coordinator: self.coordinator.clone(),
                count: self.count.clone(),
                connection: self.connection.clone(),
            }));
            self.count.set(self.count.get() + 1);
            if self.count.get() == 1 {
                self.coordinator.observability().debug("ref_count", "first subscriber, connecting");
                let conn = self.connectable.connect();
                *self.connection.borrow_mut() = Some(conn);
            }
        }
    }
    let connectable = publish(upstream, coordinator.clone());
    Rc::new(RefCountObservable {
        connectable,
        coordinator,
        count: Rc::new(Cell::new(0)),
        connection: Rc::new(RefCell::new(None)),
    })
}

/// `cache`: connects immediately on first subscribe and replays the entire
/// history (unbounded) to every subsequent subscriber, per spec.md §4.4.4.
pub fn cache<T: Clone + 'static>(upstream: Obs<T>, coordinator: Rc<crate::coordinator::Coordinator>) -> Obs<T> {
    struct CacheObservable<T> {
        connectable: Rc<dyn Connectable<T>>,
        coordinator: Rc<crate::coordinator::Coordinator>,
        connected: Cell<bool>,
    }
    impl<T: Clone + 'static> Observable<T> for CacheObservable<T> {
        fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
            self.connectable.subscribe(observer);
            if !self.connected.replace(true) {
                self.coordinator.observability().debug("cache", "first subscriber, connecting");
                self.connectable.connect();
            }
        }
    }
    let prealloc = crate::config::FlowConfig::default().cache_initial_capacity;
    let connectable = Rc::new(ConnectableObservable {
        upstream,
        hub: Multicaster::new_with_prealloc(usize::MAX, prealloc),
        connected: SimpleDisposable::new(),
        upstream_sub: RefCell::new(None),
    });
    Rc::new(CacheObservable {
        connectable,
        coordinator,
        connected: Cell::new(false),
    })
}

/// `replay`: like `cache`, but with a bounded history window and —
/// matching spec.md §4.4.4's "always eagerly subscribed" — connected to
/// `upstream` immediately rather than waiting for a first subscriber.
/// Still returns a [`Connectable`] (its `connect()` is idempotent) so
/// callers that treat every distribution operator uniformly don't need a
/// special case for `replay`.
pub fn replay<T: Clone + 'static>(
    upstream: Obs<T>,
    coordinator: Rc<crate::coordinator::Coordinator>,
    capacity: usize,
) -> Rc<dyn Connectable<T>> {
    coordinator.observability().debug("replay", "connectable created and connected eagerly");
    let connectable: Rc<dyn Connectable<T>> = Rc::new(ConnectableObservable {
        upstream,
        hub: Multicaster::new(capacity.max(1)),
        connected: SimpleDisposable::new(),
        upstream_sub: RefCell::new(None),
    });
    connectable.connect();
    connectable
}

/// A mutable single-value hot source, similar to a behavior subject: every
/// new subscriber immediately receives the current value, then subsequent
/// updates as they're set.
pub struct CellHandle<T> {
    hub: Rc<Multicaster<T>>,
}

impl<T: Clone + 'static> CellHandle<T> {
    pub fn set(&self, value: T) {
        self.hub.dispatch_next(value);
    }

    pub fn complete(&self) {
        self.hub.dispatch_complete();
    }
}

/// `cell`: spec.md §4.4.4's mutable-value primitive, used internally by
/// operators that need to broadcast "latest known state" (e.g. a shared
/// clock tick or configuration value) without wiring a full upstream
/// observable.
pub fn cell<T: Clone + 'static>(initial: T) -> (Rc<CellHandle<T>>, Obs<T>) {
    let hub = Multicaster::new(1);
    hub.dispatch_next(initial);
    let handle = Rc::new(CellHandle { hub: hub.clone() });
    let observable: Obs<T> = Rc::new(PushObservable {
        hub,
        single_subscriber: false,
        claimed: Cell::new(false),
    });
    (handle, observable)
}
