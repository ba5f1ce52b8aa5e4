//! Claudette — task-aware routing middleware for heterogeneous LLM backends.
//!
//! One [`Claudette::optimize`] call validates the input, consults the
//! persistent response cache, routes to the best-scoring healthy backend
//! behind a circuit breaker with sequential fallback, and returns a uniform
//! response annotated with cost, latency, token counts, and cache
//! provenance. A background poller keeps per-backend availability warm and
//! an append-only ledger records every completed request.
//!
//! ```no_run
//! use claudette::{Claudette, Config, RequestOptions};
//!
//! # async fn example() -> Result<(), claudette::ClaudetteError> {
//! let claudette = Claudette::new(Config::load(None)?)?;
//! claudette.initialize().await;
//! let response = claudette
//!     .optimize("explain the borrow checker", &[], RequestOptions::default())
//!     .await?;
//! println!("{} (via {})", response.content, response.backend_used);
//! claudette.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
mod orchestrator;
pub mod status;

pub use claudette_core::{
    AttemptFailure, ChatRequest, ChatResponse, ClaudetteError, FailureKind, FileContext,
    RequestOptions,
};
pub use config::Config;
pub use status::{BackendStatus, CacheSummary, StatusReport};

use claudette_backend::http::{build_client, HttpSettings};
use claudette_backend::{build_backend, Backend, BackendSettings};
use claudette_cache::ResponseCache;
use claudette_ledger::{LedgerStore, RetentionPolicy};
use claudette_router::{
    AvailabilityCache, BackendRegistry, HealthPoller, HealthPollerConfig, Router, RouterConfig,
    RouterEvent, RouterSink,
};
use std::sync::Arc;
use std::time::Duration;

/// How long availability verdicts stay fresh.
const AVAILABILITY_TTL: Duration = Duration::from_secs(60);

/// The top-level handle: configuration, store, cache, router, and the
/// background health poller.
pub struct Claudette {
    config: Config,
    store: Arc<LedgerStore>,
    cache: Arc<ResponseCache>,
    router: Arc<Router>,
    poller: HealthPoller,
}

impl Claudette {
    /// Builds the full pipeline from configuration: resolves credentials
    /// from the environment, constructs the HTTP providers, and opens the
    /// store. A store that cannot be opened degrades to the storage-less
    /// mode with a warning rather than failing the process.
    pub fn new(config: Config) -> Result<Self, ClaudetteError> {
        let client = build_client(&HttpSettings::default())
            .map_err(|e| ClaudetteError::InvalidInput(e.message))?;

        let mut backends: Vec<(Arc<dyn Backend>, u32)> = Vec::new();
        for (name, backend_config) in &config.backends {
            if !backend_config.enabled {
                continue;
            }
            let provider = backend_config.provider_kind(name)?;
            let api_key = backend_config
                .api_key_ref
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.is_empty());
            if api_key.is_none() && backend_config.api_key_ref.is_some() {
                tracing::debug!(backend = %name, "skipping backend with unresolved API key");
                continue;
            }
            let backend = build_backend(
                BackendSettings {
                    name: name.clone(),
                    provider,
                    model: backend_config.model.clone(),
                    base_url: backend_config.base_url.clone(),
                    api_key,
                    cost_per_1k_tokens: backend_config.cost_per_1k_tokens,
                },
                client.clone(),
            );
            backends.push((backend, backend_config.priority));
        }

        let store = if config.in_memory {
            Arc::new(LedgerStore::disabled())
        } else {
            match LedgerStore::open(&config.storage_dir()) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(error = %e, "ledger store unavailable, running storage-less");
                    Arc::new(LedgerStore::disabled())
                }
            }
        };

        Self::assemble(config, backends, store)
    }

    /// Builds a handle around caller-supplied backends and store. This is
    /// the seam tests and embedders use to avoid real HTTP and disk.
    pub fn with_backends(
        config: Config,
        backends: Vec<(Arc<dyn Backend>, u32)>,
        store: Arc<LedgerStore>,
    ) -> Result<Self, ClaudetteError> {
        Self::assemble(config, backends, store)
    }

    fn assemble(
        config: Config,
        backends: Vec<(Arc<dyn Backend>, u32)>,
        store: Arc<LedgerStore>,
    ) -> Result<Self, ClaudetteError> {
        let registry = Arc::new(
            BackendRegistry::new(backends)
                .map_err(|e| ClaudetteError::InvalidInput(e.to_string()))?,
        );
        let availability = Arc::new(AvailabilityCache::new(AVAILABILITY_TTL));
        let cache = Arc::new(ResponseCache::new(
            Arc::clone(&store),
            config.thresholds.max_cache_size,
        ));

        let router_config = RouterConfig {
            max_attempts: if config.router.fallback_enabled { 3 } else { 1 },
            send_deadline: Duration::from_secs(30),
            breaker: config.circuit_breaker.to_breaker_config(),
        };
        let sink = tracing_event_sink();
        let router = Arc::new(Router::new(
            Arc::clone(&registry),
            Arc::clone(&availability),
            Arc::clone(&store),
            config.scoring_weights(),
            router_config,
            Arc::clone(&sink),
        ));

        let poller = HealthPoller::new(registry, availability, HealthPollerConfig::default(), sink);

        Ok(Self {
            config,
            store,
            cache,
            router,
            poller,
        })
    }

    /// Starts the background health poller.
    pub async fn initialize(&self) {
        self.poller.start().await;
    }

    /// The effective configuration.
    pub fn get_config(&self) -> &Config {
        &self.config
    }

    /// The router, exposed for status reporting and weight updates.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The response cache.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// The ledger store.
    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    /// Runs one availability probe round immediately.
    pub async fn probe_backends(&self) {
        self.poller.probe_now().await;
    }

    /// Stops background work, flushes cache statistics, and enforces
    /// retention. Safe to call more than once.
    pub async fn cleanup(&self) {
        self.poller.stop().await;
        if let Err(e) = self.cache.flush_stats().await {
            tracing::warn!(error = %e, "failed to flush cache statistics");
        }
        if let Err(e) = self.store.sweep(RetentionPolicy::default()).await {
            tracing::warn!(error = %e, "retention sweep failed");
        }
    }
}

/// The default observability sink: structured events become tracing events,
/// with credentials already masked at the emitting layer.
fn tracing_event_sink() -> RouterSink {
    Arc::new(|event: &RouterEvent| match event {
        RouterEvent::BackendSelected {
            backend,
            score,
            reason,
            attempt,
            ..
        } => {
            tracing::debug!(backend = %backend, score, attempt, %reason, "backend selected");
        }
        RouterEvent::AttemptFailed {
            backend,
            kind,
            message,
            ..
        } => {
            tracing::debug!(backend = %backend, kind = kind.code(), %message, "attempt failed");
        }
        RouterEvent::HealthChecked {
            backend, healthy, ..
        } => {
            tracing::trace!(backend = %backend, healthy, "health check");
        }
        RouterEvent::WeightsUpdated { .. } => {
            tracing::info!("scoring weights replaced");
        }
    })
}
