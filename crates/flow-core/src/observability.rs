//! A trimmed-down observability facade: structured logging and a handful of
//! counters/gauges, injected into every `Coordinator`.
//!
//! Grounded on `spark-core/src/observability/facade.rs`
//! (`ObservabilityFacade` aggregating `Logger`/`MetricsProvider`/
//! `OpsEventBus`) — the flow engine only needs the logging and metrics
//! halves, since it has no ops-event bus of its own; operators log at
//! subscribe/dispose/terminal edges and bump a small set of gauges the
//! coordinator exposes for diagnostics.

use crate::sealed::Sealed;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Object-safe structured logger. Mirrors `spark-core::observability::Logger`
/// trimmed to a single `log` entry point plus static fields, since the flow
/// engine only emits a handful of lifecycle events.
pub trait Logger: Send + Sync + Sealed {
    fn log(&self, severity: LogSeverity, operator: &'static str, message: &str);
}

/// Default logger: discards everything. Production hosts inject their own
/// `Logger` the way the teacher injects `CoreServices`.
#[derive(Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _severity: LogSeverity, _operator: &'static str, _message: &str) {}
}

/// Minimal metrics surface: monotonic counters and point-in-time gauges,
/// keyed by a stable name. Mirrors `spark-core::observability::{Counter,
/// Gauge}` but collapsed into one trait since the flow engine's instrument
/// set is small and fixed.
pub trait MetricsProvider: Send + Sync + Sealed {
    fn increment_counter(&self, name: &'static str, by: u64);
    fn set_gauge(&self, name: &'static str, value: i64);
}

#[derive(Default)]
pub struct NoopMetrics;

impl MetricsProvider for NoopMetrics {
    fn increment_counter(&self, _name: &'static str, _by: u64) {}
    fn set_gauge(&self, _name: &'static str, _value: i64) {}
}

/// Aggregates logging and metrics capability behind a single handle that a
/// `Coordinator` can clone cheaply and pass to every operator it creates.
#[derive(Clone)]
pub struct Observability {
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn MetricsProvider>,
}

impl Observability {
    pub fn new(logger: Arc<dyn Logger>, metrics: Arc<dyn MetricsProvider>) -> Self {
        Self { logger, metrics }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopLogger), Arc::new(NoopMetrics))
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsProvider> {
        &self.metrics
    }

    pub(crate) fn trace(&self, operator: &'static str, message: &str) {
        self.logger.log(LogSeverity::Trace, operator, message);
    }

    pub(crate) fn debug(&self, operator: &'static str, message: &str) {
        self.logger.log(LogSeverity::Debug, operator, message);
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self::noop()
    }
}

// Metric name constants used across the coordinator and a few hot operators.
pub mod metric_names {
    pub const ACTIONS_SCHEDULED: &str = "flow.coordinator.actions_scheduled";
    pub const ACTIONS_INVOKED: &str = "flow.coordinator.actions_invoked";
    pub const WATCHED_DISPOSABLES: &str = "flow.coordinator.watched_disposables";
    pub const DELAYED_QUEUE_DEPTH: &str = "flow.coordinator.delayed_queue_depth";
}
