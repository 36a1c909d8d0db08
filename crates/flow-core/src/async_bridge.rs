//! The async resource bridge: lets a producer running on another thread (or
//! inside an async runtime the host owns) feed items into a single-threaded
//! flow graph, per spec.md §4.4.1 (`from_resource`)/§6.5.
//!
//! Grounded on `fedemagnani-veloce`'s SPSC channel design for the
//! thread-safe handoff primitive — rather than depending on `veloce`
//! itself, this uses `flume` (a maintained, independently-published SPSC/MPSC
//! channel crate covering the same need) plus `crossbeam-utils::CachePadded`
//! around the shared closed-flag to avoid false sharing between the
//! producer and the coordinator thread polling it.

use crate::coordinator::Coordinator;
use crate::disposable::{Disposable, SimpleDisposable};
use crate::error::FlowError;
use crate::observable::{Obs, Observable};
use crate::observer::Observer;
use crate::sealed::Sealed;
use crate::subscription::Subscription;
use crossbeam_utils::CachePadded;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often the coordinator checks the channel for newly pushed items
/// while there is outstanding downstream demand.
const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(1);

struct Shared {
    closed: CachePadded<AtomicBool>,
}

/// The consumer-side handle, owned by the flow graph. Bridges a bounded
/// `flume` channel into an [`Obs<T>`] via [`observe`].
pub struct AsyncResource<T> {
    receiver: flume::Receiver<T>,
    shared: Arc<Shared>,
}

/// The producer-side handle, safe to hand to another thread (or an async
/// task spawned on the host's own executor) and call `push`/`close` from
/// there.
pub struct AsyncResourceProducer<T> {
    sender: flume::Sender<T>,
    shared: Arc<Shared>,
}

/// Creates a bounded producer/consumer pair with room for `capacity`
/// in-flight items, matching
/// [`crate::config::FlowConfig::default_flow_buffer_size`] by default.
pub fn channel<T>(capacity: usize) -> (Arc<AsyncResourceProducer<T>>, Rc<AsyncResource<T>>) {
    let (sender, receiver) = flume::bounded(capacity.max(1));
    let shared = Arc::new(Shared {
        closed: CachePadded::new(AtomicBool::new(false)),
    });
    (
        Arc::new(AsyncResourceProducer {
            sender,
            shared: shared.clone(),
        }),
        Rc::new(AsyncResource { receiver, shared }),
    )
}

impl<T> AsyncResourceProducer<T> {
    /// Pushes an item, blocking the calling thread if the bounded channel
    /// is momentarily full. Returns `Err` once the consumer side has gone
    /// away.
    pub fn push(&self, item: T) -> Result<(), T> {
        self.sender.send(item).map_err(|e| e.into_inner())
    }

    /// Non-blocking push, for producers that would rather drop or retry
    /// than stall.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.sender.try_send(item).map_err(|e| e.into_inner())
    }

    /// Signals end-of-stream: the consumer observes `on_complete` once it
    /// has drained everything already buffered.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

struct ResourceSubscription<T> {
    resource: Rc<AsyncResource<T>>,
    downstream: Rc<dyn Observer<T>>,
    coordinator: Rc<Coordinator>,
    demand: crate::demand::Demand,
    polling: RefCell<bool>,
    state: SimpleDisposable,
}

impl<T: 'static> Disposable for ResourceSubscription<T> {
    fn dispose(&self) {
        if self.state.is_disposed() {
            return;
        }
        self.state.dispose();
        self.downstream.on_error(FlowError::disposed().shared());
    }
    fn cancel(&self) {
        self.state.dispose();
    }
    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }
}
impl<T: 'static> Sealed for ResourceSubscription<T> {}

impl<T: 'static> Subscription for ResourceSubscription<T> {
    fn request(&self, n: u64) {
        if self.is_disposed() || n == 0 {
            return;
        }
        self.demand.request(n);
        self.coordinator.observability().trace("observe_resource", "demand increased");
        if !*self.polling.borrow() {
            *self.polling.borrow_mut() = true;
            self.schedule_poll();
        }
    }
}

impl<T: 'static> ResourceSubscription<T> {
    fn schedule_poll(self: &Rc<Self>) {
        let this = self.clone();
        self.coordinator.delay(DEFAULT_POLL_PERIOD, move || {
            this.drain_once();
        });
    }

    fn drain_once(self: &Rc<Self>) {
        if self.is_disposed() {
            return;
        }
        let mut drained_any = false;
        while self.demand.has_outstanding() {
            match self.resource.receiver.try_recv() {
                Ok(item) => {
                    self.demand.try_consume_one();
                    self.downstream.on_next(item);
                    drained_any = true;
                }
                Err(flume::TryRecvError::Empty) => break,
                Err(flume::TryRecvError::Disconnected) => {
                    self.state.dispose();
                    self.downstream.on_complete();
                    return;
                }
            }
        }
        let _ = drained_any;
        if self.resource.shared.closed.load(Ordering::Acquire) && self.resource.receiver.is_empty() {
            self.state.dispose();
            self.downstream.on_complete();
            return;
        }
        if self.demand.has_outstanding() {
            self.schedule_poll();
        } else {
            *self.polling.borrow_mut() = false;
        }
    }
}

struct ResourceObservable<T> {
    coordinator: Rc<Coordinator>,
    resource: Rc<AsyncResource<T>>,
    claimed: std::cell::Cell<bool>,
}

impl<T: 'static> Observable<T> for ResourceObservable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        if self.claimed.replace(true) {
            self.coordinator.observability().debug("observe_resource", "rejecting a second observer");
            let subscription = crate::subscription::NoopSubscription::new();
            observer.on_subscribe(subscription.clone());
            subscription.dispose();
            observer.on_error(
                FlowError::cannot_open_resource("an async resource may only be observed once").shared(),
            );
            return;
        }
        self.coordinator.observability().debug("observe_resource", "subscribed, arming poll loop");
        let subscription = Rc::new(ResourceSubscription {
            resource: self.resource.clone(),
            downstream: observer.clone(),
            coordinator: self.coordinator.clone(),
            demand: crate::demand::Demand::new(),
            polling: RefCell::new(false),
            state: SimpleDisposable::new(),
        });
        self.coordinator.add_child(subscription.clone());
        observer.on_subscribe(subscription);
    }
}

/// Bridges `resource` into the flow graph as an [`Obs<T>`]: each
/// `request(n)` arms a poll loop on `coordinator` that drains up to the
/// outstanding demand from the channel every [`DEFAULT_POLL_PERIOD`].
pub fn observe<T: 'static>(coordinator: Rc<Coordinator>, resource: Rc<AsyncResource<T>>) -> Obs<T> {
    Rc::new(ResourceObservable {
        coordinator,
        resource,
        claimed: std::cell::Cell::new(false),
    })
}
