//! Status reporting for the library API and the CLI.

use crate::Claudette;
use claudette_ledger::UsageBucket;
use serde::Serialize;

/// Health and accounting summary for one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub model: String,
    /// Fresh availability verdict; `None` when the poller has not reported
    /// recently.
    pub available: Option<bool>,
    pub breaker_state: String,
    pub avg_latency_ms: Option<f64>,
    pub success_rate: Option<f64>,
    pub quality_score: Option<f64>,
    pub total_requests: u64,
    pub total_cost_eur: f64,
}

/// Cache counters for the status surface.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheSummary {
    pub entries: u64,
    pub total_bytes: u64,
    pub session_hits: u64,
    pub session_misses: u64,
    pub lifetime_hits: u64,
    pub lifetime_misses: u64,
}

/// The full status report.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: String,
    pub storage_enabled: bool,
    pub schema_version: i64,
    pub backends: Vec<BackendStatus>,
    pub cache: CacheSummary,
    pub usage_today: Option<UsageBucket>,
}

impl StatusReport {
    /// Overall health: at least one backend is not known-down with a closed
    /// or recovering breaker.
    pub fn healthy(&self) -> bool {
        self.backends
            .iter()
            .any(|b| b.available != Some(false) && b.breaker_state != "open")
    }
}

impl Claudette {
    /// Collects the current status across router, cache, and ledger.
    pub async fn get_status(&self) -> StatusReport {
        let router = self.router();
        let breaker_states: std::collections::HashMap<String, String> = router
            .breaker_snapshots()
            .into_iter()
            .map(|(name, snapshot)| (name, snapshot.state.as_str().to_string()))
            .collect();

        let backends = router
            .registry()
            .iter()
            .map(|backend| {
                let name = backend.name().to_string();
                let metrics = self.store().backend_metrics(&name);
                BackendStatus {
                    available: router.availability().get(&name),
                    breaker_state: breaker_states
                        .get(&name)
                        .cloned()
                        .unwrap_or_else(|| "closed".to_string()),
                    model: backend.model().to_string(),
                    avg_latency_ms: metrics.map(|m| m.avg_latency_ms),
                    success_rate: metrics.map(|m| m.success_rate),
                    quality_score: metrics.map(|m| m.quality_score),
                    total_requests: metrics.map(|m| m.total_requests).unwrap_or(0),
                    total_cost_eur: metrics.map(|m| m.total_cost_eur).unwrap_or(0.0),
                    name,
                }
            })
            .collect();

        let cache = match self.cache().stats().await {
            Ok(stats) => CacheSummary {
                entries: stats.entries,
                total_bytes: stats.total_bytes,
                session_hits: stats.session_hits,
                session_misses: stats.session_misses,
                lifetime_hits: stats.lifetime.hits,
                lifetime_misses: stats.lifetime.misses,
            },
            Err(e) => {
                tracing::warn!(error = %e, "cache stats unavailable");
                CacheSummary::default()
            }
        };

        let usage_today = self
            .store()
            .usage_daily(1)
            .await
            .ok()
            .and_then(|buckets| buckets.into_iter().next());

        StatusReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage_enabled: self.store().is_enabled(),
            schema_version: self.store().schema_version().await.unwrap_or(0),
            backends,
            cache,
            usage_today,
        }
    }
}
