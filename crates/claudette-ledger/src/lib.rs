//! The single relational store behind claudette.
//!
//! One SQLite database holds the append-only quota ledger, the persisted
//! response-cache entries, cache-stat rollups, rolling backend metrics, and
//! compression accounting. Schema changes are versioned migrations applied
//! in order at open time.
//!
//! The store also runs in a *disabled* mode for storage-less environments:
//! every write is a no-op and every read returns empty/zero. Tests that need
//! real behavior without touching disk use [`LedgerStore::open_in_memory`].

mod schema;
mod store;
mod types;

pub use store::LedgerStore;
pub use types::{
    BackendMetrics, CacheRow, CacheStatsTotals, LedgerError, NewQuotaEntry, QuotaEntry,
    RetentionPolicy, SweepReport, UsageBucket,
};
