//! The ledger store implementation.

use crate::schema;
use crate::types::{
    BackendMetrics, CacheRow, CacheStatsTotals, LedgerError, NewQuotaEntry, QuotaEntry,
    RetentionPolicy, SweepReport, UsageBucket,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;

const DB_FILE: &str = "claudette.db";

enum Mode {
    Sqlite(Mutex<Connection>),
    /// Storage-less fallback: writes are no-ops, reads return empty/zero.
    Disabled,
}

/// Shared persistence layer for quota rows, cache entries, and rolling
/// backend metrics.
///
/// Rolling metrics live in memory under a write lock in every mode so the
/// scorer keeps working even without backing storage; SQLite persistence is
/// best-effort on top.
pub struct LedgerStore {
    mode: Mode,
    metrics: RwLock<HashMap<String, BackendMetrics>>,
}

impl LedgerStore {
    /// Opens (or creates) the database under the given directory and brings
    /// the schema up to date.
    pub fn open(dir: &Path) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(DB_FILE))?;
        Self::from_connection(conn)
    }

    /// Fully functional store backed by an in-memory database. Used by tests
    /// that need real behavior without touching disk.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Storage-less store: all writes are no-ops, all reads return
    /// empty/zero. Rolling metrics still work in memory.
    pub fn disabled() -> Self {
        Self {
            mode: Mode::Disabled,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA temp_store   = MEMORY;",
        )?;
        schema::migrate(&conn)?;

        let mut metrics = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT backend, avg_latency_ms, success_rate, quality_score,
                        total_requests, total_cost_eur
                 FROM backend_metrics",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    BackendMetrics {
                        avg_latency_ms: row.get(1)?,
                        success_rate: row.get(2)?,
                        quality_score: row.get(3)?,
                        total_requests: row.get::<_, i64>(4)? as u64,
                        total_cost_eur: row.get(5)?,
                    },
                ))
            })?;
            for row in rows {
                let (backend, m) = row?;
                metrics.insert(backend, m);
            }
        }

        Ok(Self {
            mode: Mode::Sqlite(Mutex::new(conn)),
            metrics: RwLock::new(metrics),
        })
    }

    /// Whether the store has backing storage.
    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Sqlite(_))
    }

    /// Current schema version, zero when storage is disabled.
    pub async fn schema_version(&self) -> Result<i64, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(0),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                Ok(conn.query_row(
                    "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                    [],
                    |r| r.get(0),
                )?)
            }
        }
    }

    // ---- quota ledger -----------------------------------------------------

    /// Appends one ledger row. Returns the assigned row id (zero when
    /// storage is disabled). Rows are never updated afterwards.
    pub async fn append_quota(&self, entry: NewQuotaEntry) -> Result<i64, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(0),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                conn.execute(
                    "INSERT INTO quota_entries
                     (ts, backend, prompt_hash, tokens_input, tokens_output,
                      cost_eur, cache_hit, latency_ms)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        Utc::now().to_rfc3339(),
                        entry.backend,
                        entry.prompt_hash,
                        entry.tokens_input,
                        entry.tokens_output,
                        entry.cost_eur,
                        entry.cache_hit as i64,
                        entry.latency_ms as i64,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            }
        }
    }

    /// Ledger rows newer than `since`, newest first.
    pub async fn recent_quota(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QuotaEntry>, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(Vec::new()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let mut stmt = conn.prepare(
                    "SELECT id, ts, backend, prompt_hash, tokens_input, tokens_output,
                            cost_eur, cache_hit, latency_ms
                     FROM quota_entries
                     WHERE ts > ?1
                     ORDER BY id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![since.to_rfc3339(), limit as i64], quota_row)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            }
        }
    }

    /// Daily aggregates from the `quota_daily` view, newest first.
    pub async fn usage_daily(&self, days: usize) -> Result<Vec<UsageBucket>, LedgerError> {
        self.usage_view("quota_daily", days).await
    }

    /// Hourly aggregates from the `quota_hourly` view, newest first.
    pub async fn usage_hourly(&self, hours: usize) -> Result<Vec<UsageBucket>, LedgerError> {
        self.usage_view("quota_hourly", hours).await
    }

    async fn usage_view(&self, view: &str, limit: usize) -> Result<Vec<UsageBucket>, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(Vec::new()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let mut stmt = conn.prepare(&format!(
                    "SELECT bucket, requests, cache_hits, tokens_input, tokens_output, cost_eur
                     FROM {view} ORDER BY bucket DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map([limit as i64], |row| {
                    Ok(UsageBucket {
                        bucket: row.get(0)?,
                        requests: row.get::<_, i64>(1)? as u64,
                        cache_hits: row.get::<_, Option<i64>>(2)?.unwrap_or(0) as u64,
                        tokens_input: row.get::<_, Option<i64>>(3)?.unwrap_or(0) as u64,
                        tokens_output: row.get::<_, Option<i64>>(4)?.unwrap_or(0) as u64,
                        cost_eur: row.get::<_, Option<f64>>(5)?.unwrap_or(0.0),
                    })
                })?;
                rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
            }
        }
    }

    // ---- rolling backend metrics ------------------------------------------

    /// Folds one request outcome into the backend's rolling metrics and
    /// persists the row best-effort.
    pub async fn update_backend_metrics(
        &self,
        backend: &str,
        latency_ms: f64,
        success: bool,
        quality: f64,
        cost_eur: f64,
    ) {
        let snapshot = {
            let mut metrics = self.metrics.write();
            let entry = metrics
                .entry(backend.to_string())
                .or_insert_with(|| BackendMetrics::seed(latency_ms));
            entry.observe(latency_ms, success, quality, cost_eur);
            *entry
        };

        if let Mode::Sqlite(conn) = &self.mode {
            let conn = conn.lock().await;
            let persisted = conn.execute(
                "INSERT OR REPLACE INTO backend_metrics
                 (backend, avg_latency_ms, success_rate, quality_score,
                  total_requests, total_cost_eur, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    backend,
                    snapshot.avg_latency_ms,
                    snapshot.success_rate,
                    snapshot.quality_score,
                    snapshot.total_requests as i64,
                    snapshot.total_cost_eur,
                    Utc::now().to_rfc3339(),
                ],
            );
            if let Err(e) = persisted {
                tracing::warn!(backend, error = %e, "failed to persist backend metrics");
            }
        }
    }

    /// Rolling metrics for one backend, if any traffic has been observed.
    pub fn backend_metrics(&self, backend: &str) -> Option<BackendMetrics> {
        self.metrics.read().get(backend).copied()
    }

    /// Rolling metrics for all backends, sorted by name.
    pub fn all_backend_metrics(&self) -> Vec<(String, BackendMetrics)> {
        let mut all: Vec<_> = self
            .metrics
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    // ---- cache entries ----------------------------------------------------

    /// Fetches a cache row by key without touching access accounting.
    /// Expiry is the caller's concern.
    pub async fn cache_get(&self, key: &str) -> Result<Option<CacheRow>, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(None),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let mut stmt = conn.prepare(
                    "SELECT key, prompt_hash, response, compressed, created_at,
                            expires_at, size_bytes, access_count, last_accessed
                     FROM cache_entries WHERE key = ?1",
                )?;
                let mut rows = stmt.query_map([key], cache_row)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Inserts or replaces a cache row, then evicts least-recently-used rows
    /// beyond `max_entries`.
    pub async fn cache_put(&self, row: &CacheRow, max_entries: u64) -> Result<(), LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                conn.execute(
                    "INSERT OR REPLACE INTO cache_entries
                     (key, prompt_hash, response, compressed, created_at, expires_at,
                      size_bytes, access_count, last_accessed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        row.key,
                        row.prompt_hash,
                        row.blob,
                        row.compressed as i64,
                        row.created_at.to_rfc3339(),
                        row.expires_at.to_rfc3339(),
                        row.size_bytes as i64,
                        row.access_count as i64,
                        row.last_accessed.to_rfc3339(),
                    ],
                )?;
                conn.execute(
                    "DELETE FROM cache_entries WHERE key IN (
                         SELECT key FROM cache_entries
                         ORDER BY last_accessed ASC
                         LIMIT MAX(0, (SELECT COUNT(*) FROM cache_entries) - ?1)
                     )",
                    [max_entries as i64],
                )?;
                Ok(())
            }
        }
    }

    /// Bumps access accounting after a confirmed hit.
    pub async fn cache_touch(&self, key: &str) -> Result<(), LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                conn.execute(
                    "UPDATE cache_entries
                     SET access_count = access_count + 1, last_accessed = ?1
                     WHERE key = ?2",
                    params![Utc::now().to_rfc3339(), key],
                )?;
                Ok(())
            }
        }
    }

    /// Removes one cache row.
    pub async fn cache_delete(&self, key: &str) -> Result<bool, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(false),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let removed = conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
                Ok(removed > 0)
            }
        }
    }

    /// Drops every cache row. Returns how many were removed.
    pub async fn cache_clear(&self) -> Result<usize, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(0),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                Ok(conn.execute("DELETE FROM cache_entries", [])?)
            }
        }
    }

    /// Deletes expired rows plus never-accessed rows older than one day.
    pub async fn cache_sweep(&self, now: DateTime<Utc>) -> Result<usize, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(0),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let expired = conn.execute(
                    "DELETE FROM cache_entries WHERE expires_at <= ?1",
                    [now.to_rfc3339()],
                )?;
                let stale_cutoff = (now - ChronoDuration::days(1)).to_rfc3339();
                let unused = conn.execute(
                    "DELETE FROM cache_entries
                     WHERE access_count = 0 AND created_at <= ?1",
                    [stale_cutoff],
                )?;
                Ok(expired + unused)
            }
        }
    }

    /// Entry count and total stored bytes.
    pub async fn cache_totals(&self) -> Result<(u64, u64), LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok((0, 0)),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let totals = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM cache_entries",
                    [],
                    |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
                )?;
                Ok(totals)
            }
        }
    }

    /// Persists one hit/miss rollup row.
    pub async fn record_cache_stats(&self, hits: u64, misses: u64) -> Result<(), LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                conn.execute(
                    "INSERT INTO cache_stats (ts, hits, misses) VALUES (?1, ?2, ?3)",
                    params![Utc::now().to_rfc3339(), hits as i64, misses as i64],
                )?;
                Ok(())
            }
        }
    }

    /// Lifetime hit/miss totals across all rollups.
    pub async fn cache_stats_totals(&self) -> Result<CacheStatsTotals, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(CacheStatsTotals::default()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                let totals = conn.query_row(
                    "SELECT COALESCE(SUM(hits), 0), COALESCE(SUM(misses), 0) FROM cache_stats",
                    [],
                    |row| {
                        Ok(CacheStatsTotals {
                            hits: row.get::<_, i64>(0)? as u64,
                            misses: row.get::<_, i64>(1)? as u64,
                        })
                    },
                )?;
                Ok(totals)
            }
        }
    }

    /// Records one compression observation.
    pub async fn record_compression(
        &self,
        original_bytes: u64,
        stored_bytes: u64,
    ) -> Result<(), LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(()),
            Mode::Sqlite(conn) => {
                let conn = conn.lock().await;
                conn.execute(
                    "INSERT INTO compression_stats (ts, original_bytes, stored_bytes)
                     VALUES (?1, ?2, ?3)",
                    params![
                        Utc::now().to_rfc3339(),
                        original_bytes as i64,
                        stored_bytes as i64
                    ],
                )?;
                Ok(())
            }
        }
    }

    // ---- retention --------------------------------------------------------

    /// Enforces retention: old quota rows, old cache-stat rollups, and
    /// expired cache entries.
    pub async fn sweep(&self, policy: RetentionPolicy) -> Result<SweepReport, LedgerError> {
        match &self.mode {
            Mode::Disabled => Ok(SweepReport::default()),
            Mode::Sqlite(conn) => {
                let now = Utc::now();
                let cache_entries = self.cache_sweep(now).await?;
                let conn = conn.lock().await;
                let quota_cutoff = (now - ChronoDuration::days(policy.quota_days)).to_rfc3339();
                let quota_rows =
                    conn.execute("DELETE FROM quota_entries WHERE ts <= ?1", [quota_cutoff])?;
                let stats_cutoff =
                    (now - ChronoDuration::days(policy.cache_stats_days)).to_rfc3339();
                let cache_stat_rows =
                    conn.execute("DELETE FROM cache_stats WHERE ts <= ?1", [stats_cutoff])?;
                Ok(SweepReport {
                    quota_rows,
                    cache_stat_rows,
                    cache_entries,
                })
            }
        }
    }
}

fn quota_row(row: &Row<'_>) -> rusqlite::Result<QuotaEntry> {
    Ok(QuotaEntry {
        id: row.get(0)?,
        timestamp: parse_ts(row, 1)?,
        backend: row.get(2)?,
        prompt_hash: row.get(3)?,
        tokens_input: row.get::<_, i64>(4)? as u32,
        tokens_output: row.get::<_, i64>(5)? as u32,
        cost_eur: row.get(6)?,
        cache_hit: row.get::<_, i64>(7)? != 0,
        latency_ms: row.get::<_, i64>(8)? as u64,
    })
}

fn cache_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        key: row.get(0)?,
        prompt_hash: row.get(1)?,
        blob: row.get(2)?,
        compressed: row.get::<_, i64>(3)? != 0,
        created_at: parse_ts(row, 4)?,
        expires_at: parse_ts(row, 5)?,
        size_bytes: row.get::<_, i64>(6)? as u64,
        access_count: row.get::<_, i64>(7)? as u64,
        last_accessed: parse_ts(row, 8)?,
    })
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
