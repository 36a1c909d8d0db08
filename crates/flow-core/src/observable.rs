//! `Observable`: the producer side of the protocol, plus the operator
//! extension methods spec.md §4.3/§4.4 hang off every observable.
//!
//! Grounded on `spark-core/src/pipeline/traits/generic.rs`'s producer trait,
//! generalized from one fixed codec type to `Observable<T>` over any `T`.
//! Operator methods are a blanket `ObservableExt` impl over `Obs<T>` (a
//! reference-counted trait object) rather than inherent methods on each
//! operator struct, matching how the teacher keeps its pipeline stage
//! combinators on an extension trait separate from the stage trait itself.

use crate::coordinator::Coordinator;
use crate::observer::Observer;
use crate::sealed::Sealed;
use crate::subscription::Subscription;
use std::rc::Rc;

/// A stream of `T` values that can be subscribed to any number of times
/// unless documented otherwise (unicast sources such as [`crate::source::from_generator`]
/// reject a second subscriber with `too_many_observers`).
pub trait Observable<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>);
}

/// Reference-counted handle to an observable, the type every factory
/// function and operator method in this crate returns.
pub type Obs<T> = Rc<dyn Observable<T>>;

impl<T> Observable<T> for Obs<T> {
    fn subscribe(&self, observer: Rc<dyn Observer<T>>) {
        (**self).subscribe(observer)
    }
}

/// Observables that additionally expose a `connect()` to start forwarding
/// from their upstream on demand, per spec.md §4.4.4's `publish` family.
/// Sealed: only this crate's `publish`/`multicaster` implementations need
/// to provide it.
pub trait Connectable<T>: Observable<T> + Sealed {
    /// Begins forwarding upstream items to whichever observers have already
    /// subscribed. Idempotent: connecting twice returns the same underlying
    /// subscription's disposable.
    fn connect(&self) -> Rc<dyn Subscription>;
}

pub mod ops {
    //! Free-function operator entry points, used both by [`Obs<T>`]'s
    //! inherent convenience methods (see below) and directly by callers who
    //! prefer `flow_core::observable::ops::map(obs, f)` style composition.
    pub use crate::flowcontrol::{
        buffer, head_and_tail, on_backpressure_buffer, on_error_resume_next, prefix_and_tail, retry,
    };
    pub use crate::distribution::{auto_connect, cache, publish, ref_count, replay};
    pub use crate::multi::{combine_latest, concat, concat_map, flat_concat, flat_map, merge, merge_with_config, zip_with};
    pub use crate::sink::for_each;
    pub use crate::step::{
        distinct, do_finally, do_on_complete, do_on_error, do_on_next, filter, map, on_error_complete, reduce, take,
        take_while,
    };
    pub use crate::timing::{debounce, sample};
}

/// Convenience chaining methods implemented directly on the `Obs<T>` alias,
/// the ergonomic surface most call sites use (`source.map(..).filter(..)`).
pub trait ObsOps<T: 'static> {
    fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Obs<U>;
    fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Obs<T>;
    fn take(&self, count: u64) -> Obs<T>;
    fn take_while(&self, predicate: impl Fn(&T) -> bool + 'static) -> Obs<T>;
    fn distinct(&self) -> Obs<T>
    where
        T: Eq + std::hash::Hash + Clone;
    fn do_on_next(&self, f: impl Fn(&T) + 'static) -> Obs<T>;
    fn do_on_error(&self, f: impl Fn(&crate::error::SharedFlowError) + 'static) -> Obs<T>;
    fn do_on_complete(&self, f: impl Fn() + 'static) -> Obs<T>;
    fn do_finally(&self, f: impl Fn() + 'static) -> Obs<T>;
    fn on_error_complete(&self) -> Obs<T>;
    fn reduce<U: 'static + Clone>(&self, seed: U, f: impl Fn(U, T) -> U + 'static) -> Obs<U>;
    fn debounce(&self, coordinator: Rc<Coordinator>, quiet_period: std::time::Duration) -> Obs<T>;
    fn sample(&self, coordinator: Rc<Coordinator>, period: std::time::Duration) -> Obs<T>;
    fn on_backpressure_buffer(&self, capacity: usize, strategy: crate::flowcontrol::OverflowStrategy) -> Obs<T>;
    fn retry(&self, predicate: impl Fn(&crate::error::SharedFlowError) -> bool + 'static) -> Obs<T>;
    fn on_error_resume_next(
        &self,
        predicate: impl Fn(&crate::error::SharedFlowError) -> bool + 'static,
        fallback: Obs<T>,
    ) -> Obs<T>;
    fn buffer(&self, count: usize) -> Obs<Vec<T>>;
    fn flat_map<U: 'static>(&self, f: impl Fn(T) -> Obs<U> + 'static) -> Obs<U>;
    fn concat_map<U: 'static>(&self, f: impl Fn(T) -> Obs<U> + 'static) -> Obs<U>;
    fn prefix_and_tail(&self, prefix_len: usize) -> Obs<(Vec<T>, Obs<T>)>;
    fn head_and_tail(&self) -> Obs<(T, Obs<T>)>;
    fn publish(&self, coordinator: Rc<Coordinator>) -> Rc<dyn Connectable<T>>;
    fn auto_connect(&self, coordinator: Rc<Coordinator>, min_subscribers: usize) -> Obs<T>;
    fn ref_count(&self, coordinator: Rc<Coordinator>) -> Obs<T>;
    fn share(&self, coordinator: Rc<Coordinator>) -> Obs<T> {
        self.ref_count(coordinator)
    }
    fn cache(&self, coordinator: Rc<Coordinator>) -> Obs<T>
    where
        T: Clone;
    fn replay(&self, coordinator: Rc<Coordinator>, capacity: usize) -> Rc<dyn Connectable<T>>
    where
        T: Clone;
    fn for_each(
        self: &Obs<T>,
        coordinator: Rc<Coordinator>,
        on_next: impl FnMut(T) + 'static,
        on_error: impl FnOnce(crate::error::SharedFlowError) + 'static,
        on_complete: impl FnOnce() + 'static,
    ) -> Rc<dyn Subscription>;
}

impl<T: 'static> ObsOps<T> for Obs<T> {
    fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Obs<U> {
        crate::step::map(self.clone(), f)
    }
    fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Obs<T> {
        crate::step::filter(self.clone(), predicate)
    }
    fn take(&self, count: u64) -> Obs<T> {
        crate::step::take(self.clone(), count)
    }
    fn take_while(&self, predicate: impl Fn(&T) -> bool + 'static) -> Obs<T> {
        crate::step::take_while(self.clone(), predicate)
    }
    fn distinct(&self) -> Obs<T>
    where
        T: Eq + std::hash::Hash + Clone,
    {
        crate::step::distinct(self.clone())
    }
    fn do_on_next(&self, f: impl Fn(&T) + 'static) -> Obs<T> {
        crate::step::do_on_next(self.clone(), f)
    }
    fn do_on_error(&self, f: impl Fn(&crate::error::SharedFlowError) + 'static) -> Obs<T> {
        crate::step::do_on_error(self.clone(), f)
    }
    fn do_on_complete(&self, f: impl Fn() + 'static) -> Obs<T> {
        crate::step::do_on_complete(self.clone(), f)
    }
    fn do_finally(&self, f: impl Fn() + 'static) -> Obs<T> {
        crate::step::do_finally(self.clone(), f)
    }
    fn on_error_complete(&self) -> Obs<T> {
        crate::step::on_error_complete(self.clone())
    }
    fn reduce<U: 'static + Clone>(&self, seed: U, f: impl Fn(U, T) -> U + 'static) -> Obs<U> {
        crate::step::reduce(self.clone(), seed, f)
    }
    fn debounce(&self, coordinator: Rc<Coordinator>, quiet_period: std::time::Duration) -> Obs<T> {
        crate::timing::debounce(self.clone(), coordinator, quiet_period)
    }
    fn sample(&self, coordinator: Rc<Coordinator>, period: std::time::Duration) -> Obs<T> {
        crate::timing::sample(self.clone(), coordinator, period)
    }
    fn on_backpressure_buffer(&self, capacity: usize, strategy: crate::flowcontrol::OverflowStrategy) -> Obs<T> {
        crate::flowcontrol::on_backpressure_buffer(self.clone(), capacity, strategy)
    }
    fn retry(&self, predicate: impl Fn(&crate::error::SharedFlowError) -> bool + 'static) -> Obs<T> {
        crate::flowcontrol::retry(self.clone(), predicate)
    }
    fn on_error_resume_next(
        &self,
        predicate: impl Fn(&crate::error::SharedFlowError) -> bool + 'static,
        fallback: Obs<T>,
    ) -> Obs<T> {
        crate::flowcontrol::on_error_resume_next(self.clone(), predicate, fallback)
    }
    fn buffer(&self, count: usize) -> Obs<Vec<T>> {
        crate::flowcontrol::buffer(self.clone(), count)
    }
    fn flat_map<U: 'static>(&self, f: impl Fn(T) -> Obs<U> + 'static) -> Obs<U> {
        crate::multi::flat_map(self.clone(), f)
    }
    fn concat_map<U: 'static>(&self, f: impl Fn(T) -> Obs<U> + 'static) -> Obs<U> {
        crate::multi::concat_map(self.clone(), f)
    }
    fn prefix_and_tail(&self, prefix_len: usize) -> Obs<(Vec<T>, Obs<T>)> {
        crate::flowcontrol::prefix_and_tail(self.clone(), prefix_len)
    }
    fn head_and_tail(&self) -> Obs<(T, Obs<T>)> {
        crate::flowcontrol::head_and_tail(self.clone())
    }
    fn publish(&self, coordinator: Rc<Coordinator>) -> Rc<dyn Connectable<T>> {
        crate::distribution::publish(self.clone(), coordinator)
    }
    fn auto_connect(&self, coordinator: Rc<Coordinator>, min_subscribers: usize) -> Obs<T> {
        crate::distribution::auto_connect(self.clone(), coordinator, min_subscribers)
    }
    fn ref_count(&self, coordinator: Rc<Coordinator>) -> Obs<T> {
        crate::distribution::ref_count(self.clone(), coordinator)
    }
    fn cache(&self, coordinator: Rc<Coordinator>) -> Obs<T>
    where
        T: Clone,
    {
        crate::distribution::cache(self.clone(), coordinator)
    }
    fn replay(&self, coordinator: Rc<Coordinator>, capacity: usize) -> Rc<dyn Connectable<T>>
    where
        T: Clone,
    {
        crate::distribution::replay(self.clone(), coordinator, capacity)
    }
    fn for_each(
        self: &Obs<T>,
        coordinator: Rc<Coordinator>,
        on_next: impl FnMut(T) + 'static,
        on_error: impl FnOnce(crate::error::SharedFlowError) + 'static,
        on_complete: impl FnOnce() + 'static,
    ) -> Rc<dyn Subscription> {
        crate::sink::for_each(self.clone(), coordinator, on_next, on_error, on_complete)
    }
}
