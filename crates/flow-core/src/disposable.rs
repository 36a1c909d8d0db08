//! `Disposable`: a handle on a cancellable resource, per spec.md §3/§4.2.
//!
//! Grounded on `spark-core/src/contract.rs`'s `Cancellation` (a single
//! `Arc<AtomicBool>` flag shared by every clone) generalized to the three
//! states spec.md §3 names: `{scheduled, invoked, disposed}`. Because every
//! flow-graph object lives on one coordinator's thread, the flag is a plain
//! `Cell`, not an atomic — cross-thread signalling only happens at the async
//! resource boundary, which has its own atomic state (see `async_bridge`).

use std::cell::Cell;
use std::rc::Rc;

/// The three terminal-relevant states an `Action` can be in. A plain
/// `Disposable` (not derived from an `Action`) only ever uses `Scheduled`
/// (not-yet-disposed) and `Disposed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisposableState {
    Scheduled,
    Invoked,
    Disposed,
}

/// Capability shared by every cancellable flow-graph resource: subscriptions,
/// actions, and composite groupings of both.
pub trait Disposable {
    /// Idempotent: disposing an already-disposed resource is a no-op. For a
    /// `Subscription`'s handle on a live observer link, this is the
    /// *external* teardown spec.md §4.2/§7 describes: unless the observer
    /// has already reached a terminal event, it additionally delivers
    /// `on_error(disposed)`.
    fn dispose(&self);

    /// Cooperative, silent teardown: same terminal effect as `dispose` from
    /// the resource's own point of view, but never notifies a downstream
    /// observer. spec.md §4.2/§5/§7 distinguishes this
    /// (`Subscription::cancel`, and operators cancelling their own
    /// still-live sources) from `dispose`. Plain disposables with no
    /// observer to notify don't need to override this; the default behaves
    /// the same as `dispose`.
    fn cancel(&self) {
        self.dispose();
    }

    /// True once `dispose`/`cancel` has taken effect (terminal).
    fn is_disposed(&self) -> bool;
}

/// A disposable backed by a single shared flag, the building block for
/// subscriptions, actions, and timers alike.
#[derive(Clone)]
pub struct SimpleDisposable {
    state: Rc<Cell<DisposableState>>,
}

impl SimpleDisposable {
    pub fn new() -> Self {
        Self {
            state: Rc::new(Cell::new(DisposableState::Scheduled)),
        }
    }

    pub fn state(&self) -> DisposableState {
        self.state.get()
    }

    /// Transitions `Scheduled -> Invoked`, returning `true` iff this call
    /// performed the transition (i.e. the resource was not already invoked
    /// or disposed). Used by [`crate::action::Action::run`].
    pub fn mark_invoked(&self) -> bool {
        if self.state.get() == DisposableState::Scheduled {
            self.state.set(DisposableState::Invoked);
            true
        } else {
            false
        }
    }

    /// Returns an invoked action back to `Scheduled`, iff it is currently
    /// `Invoked` (not `Disposed`). Matches spec.md §3's `reschedule`.
    pub fn reschedule(&self) -> bool {
        if self.state.get() == DisposableState::Invoked {
            self.state.set(DisposableState::Scheduled);
            true
        } else {
            false
        }
    }
}

impl Default for SimpleDisposable {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposable for SimpleDisposable {
    fn dispose(&self) {
        self.state.set(DisposableState::Disposed);
    }

    fn is_disposed(&self) -> bool {
        self.state.get() == DisposableState::Disposed
    }
}

/// An owning handle that disposes its target when dropped, the way a
/// subscription returned from `Observable::subscribe` is typically held by
/// its caller until they are done with the stream.
pub struct DisposableHandle {
    target: Rc<dyn Disposable>,
}

impl DisposableHandle {
    pub fn new(target: Rc<dyn Disposable>) -> Self {
        Self { target }
    }

    pub fn noop() -> Self {
        Self::new(Rc::new(SimpleDisposable::new()))
    }
}

impl Disposable for DisposableHandle {
    fn dispose(&self) {
        self.target.dispose();
    }

    fn cancel(&self) {
        self.target.cancel();
    }

    fn is_disposed(&self) -> bool {
        self.target.is_disposed()
    }
}

/// Aggregates several disposables so that disposing the composite disposes
/// every element exactly once, per spec.md §3 ("Composite disposables
/// aggregate others; disposing disposes all").
#[derive(Default)]
pub struct CompositeDisposable {
    members: std::cell::RefCell<Vec<Rc<dyn Disposable>>>,
    disposed: Cell<bool>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member. If the composite is already disposed, the member is
    /// disposed immediately instead of being retained.
    pub fn add(&self, member: Rc<dyn Disposable>) {
        if self.disposed.get() {
            member.dispose();
        } else {
            self.members.borrow_mut().push(member);
        }
    }
}

impl Disposable for CompositeDisposable {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for member in self.members.borrow_mut().drain(..) {
            member.dispose();
        }
    }

    fn cancel(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for member in self.members.borrow_mut().drain(..) {
            member.cancel();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}
