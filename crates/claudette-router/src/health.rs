//! Background health polling and the availability cache.
//!
//! The poller probes every registered backend in parallel on an interval and
//! writes boolean verdicts with a TTL into the availability cache. Verdicts
//! are non-authoritative: the router only uses them to prune candidates
//! cheaply, and a missing or expired entry means "assume usable".

use crate::events::{RouterEvent, RouterSink};
use crate::registry::BackendRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// One cached availability verdict.
#[derive(Debug, Clone, Copy)]
struct Availability {
    healthy: bool,
    expires_at: Instant,
}

/// Availability verdict plus freshness, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityView {
    pub backend: String,
    pub healthy: bool,
    pub fresh: bool,
}

/// TTL-bounded per-backend availability verdicts.
#[derive(Debug)]
pub struct AvailabilityCache {
    map: DashMap<String, Availability>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            map: DashMap::new(),
            ttl,
        }
    }

    /// Records a verdict valid for one TTL.
    pub fn set(&self, backend: &str, healthy: bool) {
        self.map.insert(
            backend.to_string(),
            Availability {
                healthy,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Fresh verdict for a backend, `None` when absent or expired.
    pub fn get(&self, backend: &str) -> Option<bool> {
        let entry = self.map.get(backend)?;
        if entry.expires_at <= Instant::now() {
            None
        } else {
            Some(entry.healthy)
        }
    }

    /// Whether a fresh verdict says the backend is down.
    pub fn is_unhealthy(&self, backend: &str) -> bool {
        self.get(backend) == Some(false)
    }

    /// All verdicts, including stale ones flagged as such.
    pub fn snapshot(&self) -> Vec<AvailabilityView> {
        let now = Instant::now();
        let mut views: Vec<_> = self
            .map
            .iter()
            .map(|entry| AvailabilityView {
                backend: entry.key().clone(),
                healthy: entry.healthy,
                fresh: entry.expires_at > now,
            })
            .collect();
        views.sort_by(|a, b| a.backend.cmp(&b.backend));
        views
    }
}

/// Poller cadence and per-probe deadline.
#[derive(Debug, Clone)]
pub struct HealthPollerConfig {
    pub interval: Duration,
    pub probe_deadline: Duration,
    pub initial_delay: Duration,
}

impl Default for HealthPollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probe_deadline: Duration::from_secs(12),
            initial_delay: Duration::ZERO,
        }
    }
}

/// Background task refreshing the availability cache.
pub struct HealthPoller {
    registry: Arc<BackendRegistry>,
    cache: Arc<AvailabilityCache>,
    config: HealthPollerConfig,
    sink: RouterSink,
    task: RwLock<Option<JoinHandle<()>>>,
}

impl HealthPoller {
    pub fn new(
        registry: Arc<BackendRegistry>,
        cache: Arc<AvailabilityCache>,
        config: HealthPollerConfig,
        sink: RouterSink,
    ) -> Self {
        Self {
            registry,
            cache,
            config,
            sink,
            task: RwLock::new(None),
        }
    }

    /// Starts the background loop. Idempotent: a second start replaces the
    /// previous task.
    pub async fn start(&self) {
        let registry = Arc::clone(&self.registry);
        let cache = Arc::clone(&self.cache);
        let sink = Arc::clone(&self.sink);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(config.initial_delay).await;
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                probe_all(&registry, &cache, &sink, config.probe_deadline).await;
            }
        });

        let mut slot = self.task.write().await;
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Stops the background loop.
    pub async fn stop(&self) {
        if let Some(task) = self.task.write().await.take() {
            task.abort();
        }
    }

    /// Runs one probe round immediately, outside the interval. Used by the
    /// status command and by tests.
    pub async fn probe_now(&self) {
        probe_all(
            &self.registry,
            &self.cache,
            &self.sink,
            self.config.probe_deadline,
        )
        .await;
    }
}

impl Drop for HealthPoller {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .try_write()
            .ok()
            .and_then(|mut guard| guard.take())
        {
            task.abort();
        }
    }
}

/// Probes every backend in parallel and writes the verdicts. Best-effort:
/// a probe failure marks the backend unhealthy but never raises.
async fn probe_all(
    registry: &Arc<BackendRegistry>,
    cache: &Arc<AvailabilityCache>,
    sink: &RouterSink,
    probe_deadline: Duration,
) {
    let mut handles = Vec::with_capacity(registry.len());
    for backend in registry.iter() {
        let backend = Arc::clone(backend);
        let cache = Arc::clone(cache);
        let sink = Arc::clone(sink);
        handles.push(tokio::spawn(async move {
            let healthy =
                match tokio::time::timeout(probe_deadline, backend.is_available(probe_deadline))
                    .await
                {
                    Ok(verdict) => verdict,
                    Err(_) => false,
                };
            cache.set(backend.name(), healthy);
            tracing::debug!(backend = backend.name(), healthy, "health probe finished");
            sink(&RouterEvent::HealthChecked {
                backend: backend.name().to_string(),
                timestamp: Instant::now(),
                healthy,
            });
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use claudette_backend::{Backend, BackendResponse, CapabilityProfile};
    use claudette_core::{ChatRequest, SendError};

    struct FixedHealth {
        name: String,
        healthy: bool,
        profile: CapabilityProfile,
    }

    #[async_trait]
    impl Backend for FixedHealth {
        fn name(&self) -> &str {
            &self.name
        }
        fn model(&self) -> &str {
            "m"
        }
        fn profile(&self) -> &CapabilityProfile {
            &self.profile
        }
        async fn is_available(&self, _deadline: Duration) -> bool {
            self.healthy
        }
        fn estimate_cost(&self, _tokens: u32) -> f64 {
            0.0
        }
        fn latency_score(&self) -> f64 {
            1.0
        }
        async fn send(
            &self,
            _request: &ChatRequest,
            _deadline: Duration,
        ) -> Result<BackendResponse, SendError> {
            unreachable!()
        }
    }

    fn registry(entries: &[(&str, bool)]) -> Arc<BackendRegistry> {
        let backends = entries
            .iter()
            .map(|(name, healthy)| {
                let backend: Arc<dyn Backend> = Arc::new(FixedHealth {
                    name: (*name).into(),
                    healthy: *healthy,
                    profile: CapabilityProfile::openai(),
                });
                (backend, 1)
            })
            .collect();
        Arc::new(BackendRegistry::new(backends).unwrap())
    }

    #[tokio::test]
    async fn probe_now_fills_the_cache() {
        let cache = Arc::new(AvailabilityCache::new(Duration::from_secs(60)));
        let poller = HealthPoller::new(
            registry(&[("up", true), ("down", false)]),
            Arc::clone(&cache),
            HealthPollerConfig::default(),
            crate::events::noop_sink(),
        );
        poller.probe_now().await;

        assert_eq!(cache.get("up"), Some(true));
        assert_eq!(cache.get("down"), Some(false));
        assert!(cache.is_unhealthy("down"));
        assert!(!cache.is_unhealthy("up"));
    }

    #[tokio::test]
    async fn verdicts_expire_after_ttl() {
        let cache = AvailabilityCache::new(Duration::from_millis(20));
        cache.set("b1", true);
        assert_eq!(cache.get("b1"), Some(true));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("b1"), None);
        assert!(!cache.is_unhealthy("b1"), "stale verdicts never exclude");
    }

    #[tokio::test]
    async fn background_loop_refreshes_periodically() {
        let cache = Arc::new(AvailabilityCache::new(Duration::from_secs(60)));
        let poller = HealthPoller::new(
            registry(&[("up", true)]),
            Arc::clone(&cache),
            HealthPollerConfig {
                interval: Duration::from_millis(20),
                probe_deadline: Duration::from_millis(100),
                initial_delay: Duration::ZERO,
            },
            crate::events::noop_sink(),
        );
        poller.start().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("up"), Some(true));
        poller.stop().await;
    }
}
