//! Shared test harness: a deterministic scripted backend and a claudette
//! instance wired to it with an in-memory store.
#![allow(dead_code)]

use async_trait::async_trait;
use claudette::{Claudette, Config};
use claudette_backend::{Backend, BackendResponse, CapabilityProfile};
use claudette_core::{ChatRequest, SendError};
use claudette_ledger::LedgerStore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic fake backend replaying a scripted outcome sequence; once
/// the script runs dry it keeps returning the default response.
pub struct MockBackend {
    name: String,
    profile: CapabilityProfile,
    cost_per_1k: f64,
    delay: Duration,
    script: Mutex<VecDeque<Result<BackendResponse, SendError>>>,
    default_response: BackendResponse,
    available: AtomicBool,
    calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            profile: CapabilityProfile::openai(),
            cost_per_1k: 0.0001,
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            default_response: BackendResponse {
                content: "ok".into(),
                tokens_input: Some(10),
                tokens_output: Some(20),
            },
            available: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_profile(mut self, profile: CapabilityProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_cost_per_1k(mut self, cost: f64) -> Self {
        self.cost_per_1k = cost;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.default_response.content = content.to_string();
        self
    }

    /// Queues outcomes served before the default response kicks in.
    pub fn script(self, outcomes: Vec<Result<BackendResponse, SendError>>) -> Self {
        *self.script.lock().unwrap() = outcomes.into();
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ok(content: &str) -> Result<BackendResponse, SendError> {
        Ok(BackendResponse {
            content: content.into(),
            tokens_input: Some(10),
            tokens_output: Some(20),
        })
    }

    pub fn fail(kind: claudette_core::FailureKind, message: &str) -> Result<BackendResponse, SendError> {
        Err(SendError::new(kind, message))
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    async fn is_available(&self, _deadline: Duration) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn estimate_cost(&self, tokens: u32) -> f64 {
        f64::from(tokens) / 1000.0 * self.cost_per_1k
    }

    fn latency_score(&self) -> f64 {
        self.delay.as_secs_f64().max(0.05)
    }

    async fn send(
        &self,
        _request: &ChatRequest,
        _deadline: Duration,
    ) -> Result<BackendResponse, SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_response.clone()))
    }
}

/// A configuration suitable for tests: fast breaker reset, short cache TTL
/// left at default, no real backends.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.circuit_breaker.base_reset_ms = 100;
    config
}

/// Builds a claudette instance over mock backends and a fresh in-memory
/// store.
pub fn claudette_with(config: Config, backends: Vec<Arc<MockBackend>>) -> Claudette {
    let entries = backends
        .into_iter()
        .map(|b| (b as Arc<dyn Backend>, 1u32))
        .collect();
    let store = Arc::new(LedgerStore::open_in_memory().expect("in-memory store"));
    Claudette::with_backends(config, entries, store).expect("claudette assembly")
}
