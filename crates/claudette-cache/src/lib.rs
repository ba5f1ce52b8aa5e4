//! Fingerprint-keyed response cache.
//!
//! Entries are persisted through the ledger store; expiry is checked on
//! every read so a stale row is never served, whatever the sweeper is doing.
//! Large blobs are stored deflate-compressed with the original/stored sizes
//! recorded for the compression rollup.

use chrono::{DateTime, Utc};
use claudette_core::{ChatResponse, Fingerprint};
use claudette_ledger::{CacheRow, CacheStatsTotals, LedgerError, LedgerStore};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Blobs at or above this size are stored compressed.
const COMPRESSION_THRESHOLD: usize = 4 * 1024;

/// Errors from the cache layer. The orchestrator downgrades all of these to
/// a miss plus a warning.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage: {0}")]
    Storage(#[from] LedgerError),

    #[error("cache encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("cache compression: {0}")]
    Compression(#[from] std::io::Error),
}

impl From<CacheError> for claudette_core::ClaudetteError {
    fn from(e: CacheError) -> Self {
        claudette_core::ClaudetteError::CacheUnavailable(e.to_string())
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: u64,
    pub total_bytes: u64,
    /// Hits observed by this process since start or last rollup flush.
    pub session_hits: u64,
    /// Misses observed by this process since start or last rollup flush.
    pub session_misses: u64,
    /// Persisted lifetime totals.
    pub lifetime: CacheStatsTotals,
}

impl CacheStats {
    /// Session hit rate in `[0, 1]`; zero when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.session_hits + self.session_misses;
        if total == 0 {
            0.0
        } else {
            self.session_hits as f64 / total as f64
        }
    }
}

/// The response cache.
pub struct ResponseCache {
    store: Arc<LedgerStore>,
    max_entries: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(store: Arc<LedgerStore>, max_entries: u64) -> Self {
        Self {
            store,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up a fresh entry. Expired rows are deleted on sight and count
    /// as misses; undecodable rows are dropped the same way.
    pub async fn get(&self, key: &Fingerprint) -> Result<Option<ChatResponse>, CacheError> {
        let Some(row) = self.store.cache_get(key.as_str()).await? else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if row.expires_at <= Utc::now() {
            let _ = self.store.cache_delete(key.as_str()).await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let response = match decode_blob(&row) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(key = key.as_str(), error = %e, "dropping undecodable cache row");
                let _ = self.store.cache_delete(key.as_str()).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
        };

        self.store.cache_touch(key.as_str()).await?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(response))
    }

    /// Inserts a response under the fingerprint, replacing any previous
    /// entry for the same key.
    pub async fn put(
        &self,
        key: &Fingerprint,
        prompt_hash: &str,
        response: &ChatResponse,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let serialized = serde_json::to_vec(response)?;
        let original_bytes = serialized.len() as u64;

        let (blob, compressed) = if serialized.len() >= COMPRESSION_THRESHOLD {
            (compress(&serialized)?, true)
        } else {
            (serialized, false)
        };
        if compressed {
            let _ = self
                .store
                .record_compression(original_bytes, blob.len() as u64)
                .await;
        }

        let now = Utc::now();
        let row = CacheRow {
            key: key.as_str().to_string(),
            prompt_hash: prompt_hash.to_string(),
            size_bytes: blob.len() as u64,
            blob,
            compressed,
            created_at: now,
            expires_at: expiry(now, ttl),
            access_count: 0,
            last_accessed: now,
        };
        self.store.cache_put(&row, self.max_entries).await?;
        Ok(())
    }

    /// Deletes expired rows and never-accessed rows older than one day.
    pub async fn sweep_expired(&self) -> Result<usize, CacheError> {
        Ok(self.store.cache_sweep(Utc::now()).await?)
    }

    /// Drops every entry. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        Ok(self.store.cache_clear().await?)
    }

    /// Current statistics, combining session counters with persisted totals.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let (entries, total_bytes) = self.store.cache_totals().await?;
        let lifetime = self.store.cache_stats_totals().await?;
        Ok(CacheStats {
            entries,
            total_bytes,
            session_hits: self.hits.load(Ordering::Relaxed),
            session_misses: self.misses.load(Ordering::Relaxed),
            lifetime,
        })
    }

    /// Persists the session hit/miss counters as one rollup row and resets
    /// them. Called on shutdown and by the periodic sweeper.
    pub async fn flush_stats(&self) -> Result<(), CacheError> {
        let hits = self.hits.swap(0, Ordering::Relaxed);
        let misses = self.misses.swap(0, Ordering::Relaxed);
        if hits > 0 || misses > 0 {
            self.store.record_cache_stats(hits, misses).await?;
        }
        Ok(())
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365))
}

fn compress(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn decode_blob(row: &CacheRow) -> Result<ChatResponse, CacheError> {
    if row.compressed {
        let mut decoder = ZlibDecoder::new(row.blob.as_slice());
        let mut decompressed = Vec::with_capacity(row.blob.len() * 4);
        decoder.read_to_end(&mut decompressed)?;
        Ok(serde_json::from_slice(&decompressed)?)
    } else {
        Ok(serde_json::from_slice(&row.blob)?)
    }
}
