//! Weighted backend scoring with deterministic tie-breaks.

use crate::analyzer::{TaskAnalysis, Urgency};
use claudette_backend::Backend;
use claudette_ledger::BackendMetrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Invalid weight vectors are rejected at construction.
#[derive(Debug, Error, PartialEq)]
pub enum WeightsError {
    #[error("scoring weight {name} is negative: {value}")]
    Negative { name: &'static str, value: f64 },

    #[error("scoring weights sum to {sum}, expected 1.0")]
    BadSum { sum: f64 },
}

/// Immutable, validated scoring weights.
///
/// Replaced atomically through the router's update operation; never mutated
/// in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub task_capability: f64,
    pub language_support: f64,
    pub performance: f64,
    pub cost_efficiency: f64,
    pub quality_priority: f64,
}

impl ScoringWeights {
    /// Validates a weight vector: non-negative entries summing to 1.
    pub fn new(
        task_capability: f64,
        language_support: f64,
        performance: f64,
        cost_efficiency: f64,
        quality_priority: f64,
    ) -> Result<Self, WeightsError> {
        let weights = Self {
            task_capability,
            language_support,
            performance,
            cost_efficiency,
            quality_priority,
        };
        weights.validate()?;
        Ok(weights)
    }

    fn validate(&self) -> Result<(), WeightsError> {
        for (name, value) in [
            ("task_capability", self.task_capability),
            ("language_support", self.language_support),
            ("performance", self.performance),
            ("cost_efficiency", self.cost_efficiency),
            ("quality_priority", self.quality_priority),
        ] {
            if value < 0.0 {
                return Err(WeightsError::Negative { name, value });
            }
        }
        let sum = self.task_capability
            + self.language_support
            + self.performance
            + self.cost_efficiency
            + self.quality_priority;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(WeightsError::BadSum { sum });
        }
        Ok(())
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            task_capability: 0.40,
            language_support: 0.20,
            performance: 0.20,
            cost_efficiency: 0.10,
            quality_priority: 0.10,
        }
    }
}

/// The per-factor contributions behind one backend's score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    pub task_capability: f64,
    pub language_support: f64,
    pub performance: f64,
    pub cost_efficiency: f64,
    pub quality_priority: f64,
}

/// Scores one backend for one analyzed request. Higher is better; the
/// result stays in `[0, 1]`.
pub fn score_backend(
    backend: &dyn Backend,
    metrics: Option<&BackendMetrics>,
    analysis: &TaskAnalysis,
    weights: &ScoringWeights,
) -> ScoreBreakdown {
    let profile = backend.profile();

    let task_capability = profile.task_score(analysis.task_type);
    let language_support = language_factor(profile, &analysis.language);
    let performance = performance_factor(
        metrics
            .map(|m| m.avg_latency_ms / 1000.0)
            .unwrap_or_else(|| backend.latency_score()),
        analysis.urgency,
    );
    let cost_efficiency = cost_factor(backend.estimate_cost(analysis.estimated_tokens));
    let quality_priority = profile.quality * analysis.quality_priority;

    let total = (weights.task_capability * task_capability
        + weights.language_support * language_support
        + weights.performance * performance
        + weights.cost_efficiency * cost_efficiency
        + weights.quality_priority * quality_priority)
        .clamp(0.0, 1.0);

    ScoreBreakdown {
        total,
        task_capability,
        language_support,
        performance,
        cost_efficiency,
        quality_priority,
    }
}

fn language_factor(profile: &claudette_backend::CapabilityProfile, language: &str) -> f64 {
    if profile.specialized_for(language) {
        1.0
    } else if profile.supports_language(language) {
        0.9
    } else if profile.supports_language("en") {
        0.8
    } else {
        0.6
    }
}

/// Latency mapped against the urgency tier's tolerance. A high-urgency
/// request punishes slow backends much harder than a background one.
fn performance_factor(expected_latency_s: f64, urgency: Urgency) -> f64 {
    let tolerance_s = match urgency {
        Urgency::High => 5.0,
        Urgency::Medium => 10.0,
        Urgency::Low => 20.0,
    };
    (1.0 - expected_latency_s / tolerance_s).clamp(0.0, 1.0)
}

/// Inverse of the estimated request cost, strictly decreasing so that a
/// pricier configuration always scores below a cheaper one.
fn cost_factor(cost_eur: f64) -> f64 {
    1.0 / (1.0 + cost_eur.max(0.0) * 100.0)
}

/// Sorts scored candidates best-first with deterministic tie-breaks:
/// higher reliability, then lower unit cost, then name ascending.
pub fn rank_candidates(candidates: &mut [(Arc<dyn Backend>, ScoreBreakdown)]) {
    candidates.sort_by(|(a, sa), (b, sb)| {
        sb.total
            .total_cmp(&sa.total)
            .then_with(|| {
                b.profile()
                    .reliability
                    .total_cmp(&a.profile().reliability)
            })
            .then_with(|| a.estimate_cost(1000).total_cmp(&b.estimate_cost(1000)))
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// Compact rationale string attached to responses and events.
pub fn selection_reason(analysis: &TaskAnalysis, score: &ScoreBreakdown) -> String {
    format!(
        "task={}, lang={}, score={:.2}",
        analysis.task_type.as_str(),
        analysis.language,
        score.total
    )
}
