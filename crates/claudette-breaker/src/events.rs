//! Structured events emitted by the circuit breaker.
//!
//! The breaker reports through one process-installed [`BreakerSink`]
//! closure rather than a listener registry; claudette has exactly one
//! consumer for these events (the application's observability layer), so
//! the plumbing is a single dispatch function.

use crate::circuit::{CircuitState, OpenReason};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Events emitted as the breaker observes outcomes and changes state.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        backend: String,
        timestamp: Instant,
        from_state: CircuitState,
        to_state: CircuitState,
        /// Which trigger opened the circuit; `None` for closing transitions.
        reason: Option<OpenReason>,
    },
    /// A call was permitted through the breaker.
    CallPermitted {
        backend: String,
        timestamp: Instant,
        state: CircuitState,
    },
    /// A call was rejected because the circuit is open or probe slots ran out.
    CallRejected {
        backend: String,
        timestamp: Instant,
    },
    /// A permitted call exceeded the slow-call threshold.
    SlowCallDetected {
        backend: String,
        timestamp: Instant,
        duration: Duration,
    },
}

/// Where breaker events go. Installed once per breaker at construction.
pub type BreakerSink = Arc<dyn Fn(&BreakerEvent) + Send + Sync>;

/// A sink that drops every event. The default for breakers whose owner has
/// no observability layer wired up.
pub fn noop_sink() -> BreakerSink {
    Arc::new(|_event| {})
}
