//! Versioned schema migrations.
//!
//! Migrations are applied in order at open time; the paired downgrade
//! scripts are kept alongside so operators can roll a database back one
//! version at a time.

use crate::types::LedgerError;
use rusqlite::Connection;

pub(crate) struct Migration {
    pub version: i64,
    pub up: &'static str,
    /// Downgrade script reversing this version. Applied manually, never by
    /// the store itself.
    #[allow(dead_code)]
    pub down: &'static str,
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        up: "
            CREATE TABLE quota_entries (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                ts            TEXT NOT NULL,
                backend       TEXT NOT NULL,
                prompt_hash   TEXT NOT NULL,
                tokens_input  INTEGER NOT NULL DEFAULT 0,
                tokens_output INTEGER NOT NULL DEFAULT 0,
                cost_eur      REAL NOT NULL DEFAULT 0,
                cache_hit     INTEGER NOT NULL DEFAULT 0,
                latency_ms    INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX idx_quota_ts ON quota_entries(ts);
            CREATE INDEX idx_quota_backend ON quota_entries(backend);

            CREATE TABLE cache_entries (
                key           TEXT PRIMARY KEY,
                prompt_hash   TEXT NOT NULL,
                response      BLOB NOT NULL,
                compressed    INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL,
                expires_at    TEXT NOT NULL,
                size_bytes    INTEGER NOT NULL DEFAULT 0,
                access_count  INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT NOT NULL
            );
            CREATE INDEX idx_cache_expires ON cache_entries(expires_at);
            CREATE INDEX idx_cache_accessed ON cache_entries(last_accessed);

            CREATE TABLE cache_stats (
                id     INTEGER PRIMARY KEY AUTOINCREMENT,
                ts     TEXT NOT NULL,
                hits   INTEGER NOT NULL DEFAULT 0,
                misses INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE backend_metrics (
                backend        TEXT PRIMARY KEY,
                avg_latency_ms REAL NOT NULL,
                success_rate   REAL NOT NULL,
                quality_score  REAL NOT NULL,
                total_requests INTEGER NOT NULL DEFAULT 0,
                total_cost_eur REAL NOT NULL DEFAULT 0,
                updated_at     TEXT NOT NULL
            );

            CREATE TABLE compression_stats (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                ts             TEXT NOT NULL,
                original_bytes INTEGER NOT NULL,
                stored_bytes   INTEGER NOT NULL
            );
        ",
        down: "
            DROP TABLE compression_stats;
            DROP TABLE backend_metrics;
            DROP TABLE cache_stats;
            DROP TABLE cache_entries;
            DROP TABLE quota_entries;
        ",
    },
    Migration {
        version: 2,
        up: "
            CREATE VIEW quota_daily AS
                SELECT date(ts) AS bucket,
                       COUNT(*) AS requests,
                       SUM(cache_hit) AS cache_hits,
                       SUM(tokens_input) AS tokens_input,
                       SUM(tokens_output) AS tokens_output,
                       SUM(cost_eur) AS cost_eur
                FROM quota_entries
                GROUP BY date(ts);

            CREATE VIEW quota_hourly AS
                SELECT strftime('%Y-%m-%dT%H', ts) AS bucket,
                       COUNT(*) AS requests,
                       SUM(cache_hit) AS cache_hits,
                       SUM(tokens_input) AS tokens_input,
                       SUM(tokens_output) AS tokens_output,
                       SUM(cost_eur) AS cost_eur
                FROM quota_entries
                GROUP BY strftime('%Y-%m-%dT%H', ts);
        ",
        down: "
            DROP VIEW quota_hourly;
            DROP VIEW quota_daily;
        ",
    },
];

/// Newest schema version this build understands.
pub(crate) fn newest_version() -> i64 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Applies any pending migrations, bringing the database to the newest
/// version. A database from a newer build is refused rather than mangled.
pub(crate) fn migrate(conn: &Connection) -> Result<(), LedgerError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    let newest = newest_version();
    if current > newest {
        return Err(LedgerError::SchemaTooNew {
            found: current,
            supported: newest,
        });
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::debug!(version = migration.version, "applying schema migration");
        conn.execute_batch(migration.up)?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )?;
    }
    Ok(())
}
