//! Backend capability trait and the built-in LLM HTTP providers.
//!
//! The router treats every upstream provider as an abstract [`Backend`]:
//! availability probe, pure cost estimate, rolling latency, and a single
//! `send`. Four wire dialects are provided out of the box — OpenAI-style
//! chat completions (also covering Qwen-compatible endpoints), the Anthropic
//! messages API, and local Ollama.

pub mod http;
pub mod profile;
pub mod providers;

pub use profile::{CapabilityProfile, TaskType};
pub use providers::{build_backend, BackendSettings, ProviderKind};

use async_trait::async_trait;
use claudette_core::{ChatRequest, SendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What a provider returned for one `send`.
///
/// Token counts are `None` when the provider does not report usage; callers
/// fall back to [`BackendResponse::resolve_tokens`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub content: String,
    pub tokens_input: Option<u32>,
    pub tokens_output: Option<u32>,
}

impl BackendResponse {
    /// Provider-reported token counts, or the character-length/4 estimate
    /// when the provider stayed silent.
    pub fn resolve_tokens(&self, input_chars: usize) -> (u32, u32) {
        let tokens_in = self
            .tokens_input
            .unwrap_or_else(|| (input_chars as u32).div_ceil(4));
        let tokens_out = self
            .tokens_output
            .unwrap_or_else(|| (self.content.len() as u32).div_ceil(4));
        (tokens_in, tokens_out)
    }
}

/// One configured upstream provider.
///
/// Implementations make exactly one upstream call attempt per `send`; retry
/// and fallback policy belongs to the router.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier, unique within the process.
    fn name(&self) -> &str;

    /// The model this backend is configured to serve.
    fn model(&self) -> &str;

    /// Static capability profile used by the scorer.
    fn profile(&self) -> &CapabilityProfile;

    /// Availability probe. Must return within the deadline; a probe that
    /// cannot answer in time is reported unhealthy.
    async fn is_available(&self, deadline: Duration) -> bool;

    /// Estimated cost in EUR for the given token count. Pure function of
    /// configuration, no I/O.
    fn estimate_cost(&self, tokens: u32) -> f64;

    /// Rolling expected latency in seconds.
    fn latency_score(&self) -> f64;

    /// Performs one upstream call attempt, honoring the deadline.
    async fn send(
        &self,
        request: &ChatRequest,
        deadline: Duration,
    ) -> Result<BackendResponse, SendError>;
}

/// Exponentially-smoothed latency tracker shared by the HTTP providers.
///
/// Seeded from the profile baseline so a cold backend still scores sensibly.
#[derive(Debug)]
pub struct RollingLatency {
    millis: AtomicU64,
}

impl RollingLatency {
    const ALPHA: f64 = 0.1;

    pub fn new(baseline_ms: u64) -> Self {
        Self {
            millis: AtomicU64::new(baseline_ms),
        }
    }

    /// Folds one observed call duration into the average.
    pub fn observe(&self, duration: Duration) {
        let sample = duration.as_millis().min(u128::from(u64::MAX)) as f64;
        let current = self.millis.load(Ordering::Relaxed) as f64;
        let next = current * (1.0 - Self::ALPHA) + sample * Self::ALPHA;
        self.millis.store(next as u64, Ordering::Relaxed);
    }

    /// Current expected latency in milliseconds.
    pub fn millis(&self) -> u64 {
        self.millis.load(Ordering::Relaxed)
    }

    /// Current expected latency in seconds.
    pub fn seconds(&self) -> f64 {
        self.millis() as f64 / 1000.0
    }
}
