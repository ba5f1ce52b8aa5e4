//! Per-backend circuit breaker.
//!
//! Each configured backend gets one [`CircuitBreaker`] guarding it against
//! failure storms. The breaker tracks a sliding window of recent call
//! outcomes and walks the classic Closed → Open → HalfOpen state machine:
//!
//! - **Closed**: calls permitted. Opens on a run of consecutive failures, an
//!   excessive failure rate, or an excessive slow-call rate.
//! - **Open**: calls rejected. A progressive reset timer (growing with the
//!   failure run, capped at 30 minutes) governs the transition to half-open.
//! - **HalfOpen**: a bounded number of probe calls; one success closes the
//!   breaker, one failure reopens it with a restarted timer.
//!
//! State transitions are observable through the installed event sink.

mod circuit;
mod config;
mod events;

pub use circuit::{BreakerSnapshot, CallOutcome, CircuitState, OpenReason};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use events::{noop_sink, BreakerEvent, BreakerSink};

use circuit::Circuit;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Thread-safe circuit breaker handle for one backend.
///
/// Cloning shares the underlying state; the router keeps one per registered
/// backend and consults it on every attempt.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<BreakerConfig>,
    sink: BreakerSink,
    circuit: Arc<Mutex<Circuit>>,
}

impl CircuitBreaker {
    /// Creates a breaker for the named backend. Events are dropped; state
    /// transitions still reach the tracing layer.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_sink(name, config, noop_sink())
    }

    /// Creates a breaker that reports transitions and outcomes to the given
    /// sink.
    pub fn with_sink(name: impl Into<String>, config: BreakerConfig, sink: BreakerSink) -> Self {
        let name: Arc<str> = name.into().into();
        Self {
            circuit: Arc::new(Mutex::new(Circuit::new())),
            config: Arc::new(config),
            sink,
            name,
        }
    }

    /// The backend this breaker guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks for permission to place one call.
    ///
    /// Returns `true` when the call may proceed. While half-open this also
    /// reserves one of the bounded probe slots; the caller must follow up
    /// with exactly one [`record`](Self::record).
    pub fn try_acquire(&self) -> bool {
        self.circuit
            .lock()
            .try_acquire(&self.name, &self.config, &self.sink)
    }

    /// Records the outcome of a permitted call.
    pub fn record(&self, outcome: CallOutcome) {
        self.circuit
            .lock()
            .record(&self.name, &self.config, &self.sink, outcome);
    }

    /// Records a successful call of the given duration.
    pub fn record_success(&self, duration: Duration) {
        self.record(CallOutcome::success(duration));
    }

    /// Records a failed call of the given duration.
    pub fn record_failure(&self, duration: Duration) {
        self.record(CallOutcome::failure(duration));
    }

    /// Current state without side effects.
    ///
    /// An Open breaker whose reset timer has elapsed still reports `Open`
    /// here; the half-open transition happens on the next `try_acquire`.
    pub fn state(&self) -> CircuitState {
        self.circuit.lock().state()
    }

    /// Whether the breaker currently rejects regular calls.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Whether a call would currently be admitted, without reserving a probe
    /// slot or transitioning state. An Open breaker whose reset timer has
    /// elapsed reports `true` here.
    pub fn is_call_permitted(&self) -> bool {
        self.circuit.lock().would_permit(&self.config)
    }

    /// Point-in-time view of the breaker internals for status reporting.
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.circuit.lock().snapshot(&self.config)
    }

    /// Forces the breaker closed and clears the window. Used by explicit
    /// operator resets.
    pub fn reset(&self) {
        self.circuit.lock().force_closed(&self.name, &self.sink);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}
