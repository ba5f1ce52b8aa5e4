//! Structured events emitted by the router and health poller.
//!
//! Routing observability flows through one process-installed [`RouterSink`]
//! closure. The application decides where events land (tracing, a test
//! recorder); the router and poller just call the sink.

use claudette_core::FailureKind;
use std::sync::Arc;
use std::time::Instant;

/// Routing and health observability events.
#[derive(Debug, Clone)]
pub enum RouterEvent {
    /// A backend was chosen for an attempt, with the rationale.
    BackendSelected {
        backend: String,
        timestamp: Instant,
        score: f64,
        reason: String,
        attempt: usize,
    },
    /// One attempt failed; the router may fall back.
    AttemptFailed {
        backend: String,
        timestamp: Instant,
        kind: FailureKind,
        message: String,
    },
    /// A health probe finished.
    HealthChecked {
        backend: String,
        timestamp: Instant,
        healthy: bool,
    },
    /// The scoring weights were replaced.
    WeightsUpdated { timestamp: Instant },
}

/// Where router and poller events go.
pub type RouterSink = Arc<dyn Fn(&RouterEvent) + Send + Sync>;

/// A sink that drops every event.
pub fn noop_sink() -> RouterSink {
    Arc::new(|_event| {})
}
