//! flow-core: the reactive-dataflow runtime embedded by the surrounding
//! actor framework — a single-threaded, Reactive-Streams-shaped operator
//! graph (`Observable`/`Observer`/`Subscription`/`Disposable`) driven by a
//! cooperative [`coordinator::Coordinator`], plus the two bridges that let
//! it talk to the outside world: [`async_bridge`] (cross-thread producers
//! in) and [`stream_bridge`] (batched, credited consumers out).
//!
//! Everything in this crate assumes it runs on the thread that owns its
//! `Coordinator`; operator graphs are built from `Rc`/`Cell`/`RefCell`, not
//! `Arc`/`Mutex`. Crossing a thread boundary means going through
//! [`async_bridge::channel`] in one direction or [`stream_bridge`] in the
//! other.

mod action;
mod async_bridge;
mod builder;
mod config;
mod coordinator;
mod demand;
mod disposable;
mod distribution;
mod error;
mod flowcontrol;
mod multi;
mod observability;
mod observable;
mod observer;
mod sealed;
mod sink;
mod source;
mod step;
mod stream_bridge;
mod subscription;
mod time;
mod timing;
mod util;

pub use action::Action;
pub use async_bridge::{channel, observe as observe_resource, AsyncResource, AsyncResourceProducer};
pub use builder::{observe_on, ObservableBuilder};
pub use config::FlowConfig;
pub use coordinator::Coordinator;
pub use demand::{Demand, UNBOUNDED};
pub use disposable::{CompositeDisposable, Disposable, DisposableHandle, DisposableState, SimpleDisposable};
pub use distribution::{auto_connect, cache, cell, mcast, publish, ref_count, replay, ucast, CellHandle, PushHandle};
pub use error::{codes, ErrorCategory, ErrorCause, FlowError, Result, SharedFlowError};
pub use observability::{metric_names, LogSeverity, Logger, MetricsProvider, NoopLogger, NoopMetrics, Observability};
pub use observable::{ops, Connectable, Obs, Observable, ObsOps};
pub use observer::{ClosureObserver, Event, Observer};
pub use source::{
    defer, empty, fail, from_callable, from_container, from_generator, from_resource, interval, iota, just, never,
    prefetch, range, repeat,
};
pub use stream_bridge::{bridge_once, BridgeCredits, StreamBridge};
pub use subscription::{DemandSubscription, NoopSubscription, Subscription};
pub use time::{MockClock, MonotonicInstant, SteadyClock, SystemClock};

pub use flowcontrol::{
    buffer, head_and_tail, on_backpressure_buffer, on_error_resume_next, prefix_and_tail, retry, OverflowStrategy,
};
pub use multi::{combine_latest, concat, concat_map, flat_concat, flat_map, merge, merge_with_config, zip_with};
pub use sink::{for_each, for_each_with_batch};
pub use timing::{debounce, sample};

/// Common imports for building and composing observables:
/// `use flow_core::prelude::*;` pulls in the core protocol traits plus
/// [`ObsOps`], so chained operator calls (`source.map(..).filter(..)`)
/// resolve without reaching into individual modules.
pub mod prelude {
    pub use crate::{
        Coordinator, Disposable, Event, FlowConfig, FlowError, Obs, Observable, ObsOps, Observer, Result,
        SharedFlowError, Subscription,
    };
}
