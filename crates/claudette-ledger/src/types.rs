//! Row types and errors for the ledger store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the ledger store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported schema version {found} (newest known is {supported})")]
    SchemaTooNew { found: i64, supported: i64 },
}

impl From<LedgerError> for claudette_core::ClaudetteError {
    fn from(e: LedgerError) -> Self {
        claudette_core::ClaudetteError::LedgerUnavailable(e.to_string())
    }
}

/// A quota ledger row as persisted. Rows are append-only; ids increase
/// monotonically within a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub backend: String,
    pub prompt_hash: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_eur: f64,
    pub cache_hit: bool,
    pub latency_ms: u64,
}

/// Fields for one new ledger row; id and timestamp are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuotaEntry {
    pub backend: String,
    pub prompt_hash: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_eur: f64,
    pub cache_hit: bool,
    pub latency_ms: u64,
}

/// Exponentially-smoothed per-backend statistics driving the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackendMetrics {
    pub avg_latency_ms: f64,
    /// Success rate in `[0, 1]`.
    pub success_rate: f64,
    /// Estimated output quality in `[0, 1]`.
    pub quality_score: f64,
    pub total_requests: u64,
    pub total_cost_eur: f64,
}

impl BackendMetrics {
    /// Smoothing factor for all three rolling values.
    pub const ALPHA: f64 = 0.1;

    /// A fresh entry seeded from first observation defaults.
    pub fn seed(latency_ms: f64) -> Self {
        Self {
            avg_latency_ms: latency_ms,
            success_rate: 1.0,
            quality_score: 0.7,
            total_requests: 0,
            total_cost_eur: 0.0,
        }
    }

    /// Folds one outcome into the averages. Rates stay clamped to `[0, 1]`.
    pub fn observe(&mut self, latency_ms: f64, success: bool, quality: f64, cost_eur: f64) {
        let a = Self::ALPHA;
        self.avg_latency_ms = self.avg_latency_ms * (1.0 - a) + latency_ms * a;
        let success_sample = if success { 1.0 } else { 0.0 };
        self.success_rate = (self.success_rate * (1.0 - a) + success_sample * a).clamp(0.0, 1.0);
        if success {
            self.quality_score =
                (self.quality_score * (1.0 - a) + quality.clamp(0.0, 1.0) * a).clamp(0.0, 1.0);
        }
        self.total_requests += 1;
        self.total_cost_eur += cost_eur.max(0.0);
    }
}

/// One aggregate bucket from the daily/hourly views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    /// Bucket label: a date for daily buckets, date+hour for hourly ones.
    pub bucket: String,
    pub requests: u64,
    pub cache_hits: u64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub cost_eur: f64,
}

/// A persisted response-cache row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRow {
    pub key: String,
    pub prompt_hash: String,
    pub blob: Vec<u8>,
    pub compressed: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

/// Running totals from the cache-stats rollup table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsTotals {
    pub hits: u64,
    pub misses: u64,
}

/// How long each table keeps its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub quota_days: i64,
    pub cache_stats_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            quota_days: 30,
            cache_stats_days: 7,
        }
    }
}

/// What one sweeper pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub quota_rows: usize,
    pub cache_stat_rows: usize,
    pub cache_entries: usize,
}
