//! `FlowError` is the stable error domain shared by every operator, the
//! stream bridge, and the async resource bridge.
//!
//! Grounded on `spark-core/src/error.rs`'s `CoreError`/`ErrorCategory` split:
//! a stable `&'static str` code carries machine-readable identity, an owned
//! message carries the human-readable detail, and an optional boxed cause
//! threads through the chain so `std::error::Error::source` keeps working.

use std::borrow::Cow;
use std::fmt;

/// Stable error codes, matching spec.md §6.7 one-for-one.
pub mod codes {
    pub const INVALID_OBSERVABLE: &str = "flow.invalid_observable";
    pub const TOO_MANY_OBSERVERS: &str = "flow.too_many_observers";
    pub const CANNOT_RESUBSCRIBE_STREAM: &str = "flow.cannot_resubscribe_stream";
    pub const CANNOT_COMBINE_EMPTY_OBSERVABLES: &str = "flow.cannot_combine_empty_observables";
    pub const BACKPRESSURE_OVERFLOW: &str = "flow.backpressure_overflow";
    pub const END_OF_STREAM: &str = "flow.end_of_stream";
    pub const DISPOSED: &str = "flow.disposed";
    pub const REQUEST_TIMEOUT: &str = "flow.request_timeout";
    pub const PROTOCOL_ERROR: &str = "flow.protocol_error";
    pub const CANNOT_OPEN_RESOURCE: &str = "flow.cannot_open_resource";
    pub const BROKEN_PROMISE: &str = "flow.broken_promise";
    pub const INTERNAL: &str = "flow.internal";
}

/// Error classification, driving automated retry/backoff policy in
/// `retry`/`on_error_resume_next` without forcing callers to pattern-match
/// on string codes. Mirrors `spark-core::error::ErrorCategory`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Retryable,
    NonRetryable,
    ResourceExhausted,
    ProtocolViolation,
    Cancelled,
    Timeout,
}

pub type ErrorCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The crate's unified error type. Cheap to clone the code/category; the
/// message and cause are owned once and shared through `Arc` only when a
/// caller explicitly needs to fan the same error out to multiple observers
/// (see [`FlowError::shared`]).
#[derive(Debug)]
pub struct FlowError {
    code: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<ErrorCause>,
}

impl FlowError {
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            category: ErrorCategory::NonRetryable,
            cause: None,
        }
    }

    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn category(&self) -> &ErrorCategory {
        &self.category
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// Wraps this error in an `Arc` so the same terminal event can be
    /// delivered to every subscriber of a hot operator (`mcast`, `cache`,
    /// `replay`, `cell`) without requiring `Clone` on the underlying cause.
    pub fn shared(self) -> SharedFlowError {
        SharedFlowError(std::sync::Arc::new(self))
    }

    pub fn disposed() -> Self {
        Self::new(codes::DISPOSED, "subscription was externally disposed").with_category(ErrorCategory::Cancelled)
    }

    pub fn backpressure_overflow() -> Self {
        Self::new(codes::BACKPRESSURE_OVERFLOW, "on_backpressure_buffer overflowed")
            .with_category(ErrorCategory::ResourceExhausted)
    }

    pub fn end_of_stream() -> Self {
        Self::new(codes::END_OF_STREAM, "unexpected end of stream").with_category(ErrorCategory::ProtocolViolation)
    }

    pub fn protocol_error(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::PROTOCOL_ERROR, detail).with_category(ErrorCategory::ProtocolViolation)
    }

    pub fn too_many_observers() -> Self {
        Self::new(codes::TOO_MANY_OBSERVERS, "a unicast source may only have one observer")
    }

    pub fn cannot_resubscribe_stream() -> Self {
        Self::new(
            codes::CANNOT_RESUBSCRIBE_STREAM,
            "a stream bridge subscription cannot be re-subscribed",
        )
    }

    pub fn cannot_combine_empty_observables() -> Self {
        Self::new(
            codes::CANNOT_COMBINE_EMPTY_OBSERVABLES,
            "an input of combine_latest completed before producing a value",
        )
    }

    pub fn cannot_open_resource(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::CANNOT_OPEN_RESOURCE, detail).with_category(ErrorCategory::NonRetryable)
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for FlowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

/// A reference-counted `FlowError`, implementing `Clone` so hot operators
/// can deliver the exact same terminal event to every live subscriber.
#[derive(Clone, Debug)]
pub struct SharedFlowError(std::sync::Arc<FlowError>);

impl SharedFlowError {
    pub fn new(error: FlowError) -> Self {
        Self(std::sync::Arc::new(error))
    }
}

impl std::ops::Deref for SharedFlowError {
    type Target = FlowError;
    fn deref(&self) -> &FlowError {
        &self.0
    }
}

impl fmt::Display for SharedFlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;
