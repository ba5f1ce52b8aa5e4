//! Request dispatch: task analysis, backend scoring, circuit-gated execution
//! with sequential fallback, and background health polling.
//!
//! The [`Router`] owns the backend registry, one circuit breaker per
//! backend, and the availability cache the health poller keeps warm. A
//! request flows: analyze → score candidates → gate → send → record →
//! fallback to the next candidate on retryable failure.

pub mod analyzer;
pub mod events;
pub mod health;
pub mod registry;
pub mod router;
pub mod scorer;

pub use analyzer::{analyze, TaskAnalysis, Urgency};
pub use events::{noop_sink, RouterEvent, RouterSink};
pub use health::{AvailabilityCache, AvailabilityView, HealthPoller, HealthPollerConfig};
pub use registry::{BackendRegistry, RegistryError};
pub use router::{Router, RouterConfig};
pub use scorer::{rank_candidates, score_backend, ScoreBreakdown, ScoringWeights, WeightsError};
