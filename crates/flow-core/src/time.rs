//! A minimal monotonic clock abstraction feeding `Coordinator::steady_time`.
//!
//! Grounded on `spark-core/src/time/clock.rs`'s `Clock` trait, trimmed down
//! to a pure time source: the coordinator's cooperative scheduler owns its
//! own delayed-action queue, so unlike the teacher's `Clock::sleep` (which
//! returns a future for an external executor to poll) timers here are
//! driven entirely by `Coordinator::run_until_idle`/`advance_to`.

use std::time::{Duration, Instant};

/// A point on the coordinator's monotonic timeline. Opaque on purpose —
/// only addition/comparison against other `MonotonicInstant`s is supported,
/// matching spec.md §4.1's "monotonic clock" requirement without exposing
/// wall-clock semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn saturating_add(self, d: Duration) -> Self {
        Self(self.0 + d)
    }

    pub fn duration_since(self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

/// Abstract clock; production code uses [`SystemClock`], tests use
/// [`MockClock`] to drive timing operators (`debounce`, `sample`,
/// `interval`) deterministically.
pub trait SteadyClock {
    fn now(&self) -> MonotonicInstant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SteadyClock for SystemClock {
    fn now(&self) -> MonotonicInstant {
        MonotonicInstant(Instant::now())
    }
}

/// A clock whose reading only advances when told to, for tests that need
/// to control exactly when a `debounce`/`sample`/`interval` timer fires
/// without sleeping real time.
pub struct MockClock {
    base: Instant,
    offset: std::cell::Cell<Duration>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: std::cell::Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SteadyClock for MockClock {
    fn now(&self) -> MonotonicInstant {
        MonotonicInstant(self.base + self.offset.get())
    }
}
