//! Candidate selection and circuit-gated execution with sequential fallback.

use crate::analyzer::{analyze, TaskAnalysis};
use crate::events::{RouterEvent, RouterSink};
use crate::health::AvailabilityCache;
use crate::registry::BackendRegistry;
use crate::scorer::{rank_candidates, score_backend, selection_reason, ScoreBreakdown, ScoringWeights};
use claudette_backend::Backend;
use claudette_breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use claudette_core::{AttemptFailure, ChatRequest, ChatResponse, ClaudetteError, FailureKind};
use claudette_ledger::LedgerStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Router construction parameters.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Distinct backends tried per user request, circuit rejections included.
    pub max_attempts: usize,
    /// Base per-send deadline; the effective deadline is the smaller of this
    /// and what remains of the whole-request budget.
    pub send_deadline: Duration,
    /// Breaker settings applied to every backend.
    pub breaker: BreakerConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            send_deadline: Duration::from_secs(30),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Orchestrates selection and execution for one process.
///
/// Owns the registry, one breaker per backend, and the scoring weights;
/// shares the availability cache with the health poller and the ledger with
/// the orchestrator.
pub struct Router {
    registry: Arc<BackendRegistry>,
    breakers: HashMap<String, CircuitBreaker>,
    availability: Arc<AvailabilityCache>,
    ledger: Arc<LedgerStore>,
    weights: RwLock<Arc<ScoringWeights>>,
    sink: RouterSink,
    config: RouterConfig,
}

impl Router {
    pub fn new(
        registry: Arc<BackendRegistry>,
        availability: Arc<AvailabilityCache>,
        ledger: Arc<LedgerStore>,
        weights: ScoringWeights,
        config: RouterConfig,
        sink: RouterSink,
    ) -> Self {
        let breakers = registry
            .iter()
            .map(|backend| {
                (
                    backend.name().to_string(),
                    CircuitBreaker::new(backend.name(), config.breaker.clone()),
                )
            })
            .collect();
        Self {
            registry,
            breakers,
            availability,
            ledger,
            weights: RwLock::new(Arc::new(weights)),
            sink,
            config,
        }
    }

    /// The registry this router serves.
    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// The availability cache the health poller keeps warm.
    pub fn availability(&self) -> &Arc<AvailabilityCache> {
        &self.availability
    }

    /// Current scoring weights.
    pub fn weights(&self) -> Arc<ScoringWeights> {
        Arc::clone(&self.weights.read())
    }

    /// Atomically replaces the scoring weights.
    pub fn update_weights(&self, weights: ScoringWeights) {
        *self.weights.write() = Arc::new(weights);
        (self.sink)(&RouterEvent::WeightsUpdated {
            timestamp: Instant::now(),
        });
    }

    /// Breaker state for one backend.
    pub fn breaker(&self, backend: &str) -> Option<&CircuitBreaker> {
        self.breakers.get(backend)
    }

    /// Breaker snapshots for all backends, sorted by name.
    pub fn breaker_snapshots(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut snapshots: Vec<_> = self
            .breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    /// Full pipeline: analyze, score, gate, send, record, fall back.
    pub async fn route(&self, request: &ChatRequest) -> Result<ChatResponse, ClaudetteError> {
        let analysis = analyze(request);
        let candidates = self.candidates(request, &analysis)?;
        self.execute(request, &analysis, candidates).await
    }

    /// Raw mode: no scoring, no fallback. One attempt against the first
    /// backend in priority order whose circuit admits a call.
    pub async fn route_raw(&self, request: &ChatRequest) -> Result<ChatResponse, ClaudetteError> {
        if self.registry.is_empty() {
            return Err(ClaudetteError::NoBackendsAvailable);
        }
        let analysis = analyze(request);
        let weights = self.weights();
        let mut rejected = Vec::new();
        for backend in self.registry.iter() {
            let Some(breaker) = self.breakers.get(backend.name()) else {
                continue;
            };
            if !breaker.is_call_permitted() {
                rejected.push(AttemptFailure {
                    backend: backend.name().to_string(),
                    kind: FailureKind::CircuitOpen,
                    message: "circuit open".into(),
                });
                continue;
            }
            let breakdown = score_backend(
                backend.as_ref(),
                self.ledger.backend_metrics(backend.name()).as_ref(),
                &analysis,
                &weights,
            );
            let candidates = vec![(Arc::clone(backend), breakdown)];
            return self.execute(request, &analysis, candidates).await;
        }
        Err(ClaudetteError::AllBackendsFailed { attempts: rejected })
    }

    /// Builds the scored candidate list: registered backends minus open
    /// circuits minus fresh-unhealthy verdicts, best-first. A forced backend
    /// shrinks the set to one.
    fn candidates(
        &self,
        request: &ChatRequest,
        analysis: &TaskAnalysis,
    ) -> Result<Vec<(Arc<dyn Backend>, ScoreBreakdown)>, ClaudetteError> {
        let weights = self.weights();

        if let Some(forced) = &request.options.forced_backend {
            let backend = self.registry.get(forced).ok_or_else(|| {
                ClaudetteError::InvalidInput(format!("backend {forced:?} is not configured"))
            })?;
            if self.availability.is_unhealthy(forced) {
                return Err(ClaudetteError::InvalidInput(format!(
                    "backend {forced:?} is not available"
                )));
            }
            let breakdown = score_backend(
                backend.as_ref(),
                self.ledger.backend_metrics(forced).as_ref(),
                analysis,
                &weights,
            );
            return Ok(vec![(Arc::clone(backend), breakdown)]);
        }

        let mut candidates: Vec<(Arc<dyn Backend>, ScoreBreakdown)> = Vec::new();
        let mut circuit_rejected: Vec<AttemptFailure> = Vec::new();
        for backend in self.registry.iter() {
            if self.availability.is_unhealthy(backend.name()) {
                continue;
            }
            let permitted = self
                .breakers
                .get(backend.name())
                .is_some_and(|b| b.is_call_permitted());
            if !permitted {
                circuit_rejected.push(AttemptFailure {
                    backend: backend.name().to_string(),
                    kind: FailureKind::CircuitOpen,
                    message: "circuit open".into(),
                });
                continue;
            }
            let breakdown = score_backend(
                backend.as_ref(),
                self.ledger.backend_metrics(backend.name()).as_ref(),
                analysis,
                &weights,
            );
            candidates.push((Arc::clone(backend), breakdown));
        }

        if candidates.is_empty() {
            // All circuits open is a routing failure with attribution; an
            // empty or fully-unhealthy pool is NoBackendsAvailable.
            return Err(if circuit_rejected.is_empty() {
                ClaudetteError::NoBackendsAvailable
            } else {
                ClaudetteError::AllBackendsFailed {
                    attempts: circuit_rejected,
                }
            });
        }
        rank_candidates(&mut candidates);
        Ok(candidates)
    }

    /// Runs the candidates strictly sequentially, at most one attempt per
    /// backend and `max_attempts` attempts overall.
    async fn execute(
        &self,
        request: &ChatRequest,
        analysis: &TaskAnalysis,
        candidates: Vec<(Arc<dyn Backend>, ScoreBreakdown)>,
    ) -> Result<ChatResponse, ClaudetteError> {
        let deadline_at = Instant::now() + request.options.timeout();
        let input_chars = request.total_input_chars();
        let mut attempts: Vec<AttemptFailure> = Vec::new();

        for (backend, breakdown) in candidates {
            if attempts.len() >= self.config.max_attempts {
                break;
            }
            let name = backend.name().to_string();
            let Some(breaker) = self.breakers.get(&name) else {
                continue;
            };

            if !breaker.try_acquire() {
                (self.sink)(&RouterEvent::AttemptFailed {
                    backend: name.clone(),
                    timestamp: Instant::now(),
                    kind: FailureKind::CircuitOpen,
                    message: "circuit open".into(),
                });
                attempts.push(AttemptFailure {
                    backend: name,
                    kind: FailureKind::CircuitOpen,
                    message: "circuit open".into(),
                });
                continue;
            }

            let reason = selection_reason(analysis, &breakdown);
            (self.sink)(&RouterEvent::BackendSelected {
                backend: name.clone(),
                timestamp: Instant::now(),
                score: breakdown.total,
                reason: reason.clone(),
                attempt: attempts.len() + 1,
            });

            let remaining = deadline_at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                breaker.record_failure(Duration::ZERO);
                attempts.push(AttemptFailure {
                    backend: name,
                    kind: FailureKind::Timeout,
                    message: "request deadline exhausted before send".into(),
                });
                break;
            }
            let send_deadline = remaining.min(self.config.send_deadline);

            let send_started = Instant::now();
            let outcome =
                match tokio::time::timeout(send_deadline, backend.send(request, send_deadline))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(claudette_core::SendError::new(
                        FailureKind::Timeout,
                        format!("no answer within {send_deadline:?}"),
                    )),
                };
            let elapsed = send_started.elapsed();

            match outcome {
                Ok(reply) => {
                    breaker.record_success(elapsed);
                    let (tokens_in, tokens_out) = reply.resolve_tokens(input_chars);
                    let cost_eur =
                        ChatResponse::round_cost(backend.estimate_cost(tokens_in + tokens_out));
                    let quality = estimate_quality(
                        reply.content.len(),
                        tokens_in,
                        tokens_out,
                        elapsed,
                        cost_eur,
                    );
                    self.ledger
                        .update_backend_metrics(
                            &name,
                            elapsed.as_millis() as f64,
                            true,
                            quality,
                            cost_eur,
                        )
                        .await;

                    #[cfg(feature = "metrics")]
                    metrics::counter!("claudette_requests_total", "backend" => name.clone())
                        .increment(1);

                    let mut metadata = BTreeMap::new();
                    metadata.insert("selection_reason".to_string(), reason.into());
                    metadata.insert(
                        "model".to_string(),
                        request
                            .options
                            .model
                            .clone()
                            .unwrap_or_else(|| backend.model().to_string())
                            .into(),
                    );
                    metadata.insert("attempts".to_string(), (attempts.len() as u64 + 1).into());
                    metadata.insert(
                        "task_type".to_string(),
                        analysis.task_type.as_str().into(),
                    );
                    metadata.insert("language".to_string(), analysis.language.clone().into());

                    return Ok(ChatResponse {
                        content: reply.content,
                        backend_used: name,
                        cost_eur,
                        latency_ms: elapsed.as_millis() as u64,
                        tokens_input: tokens_in,
                        tokens_output: tokens_out,
                        cache_hit: false,
                        metadata,
                    });
                }
                Err(send_err) => {
                    breaker.record_failure(elapsed);
                    self.ledger
                        .update_backend_metrics(&name, elapsed.as_millis() as f64, false, 0.0, 0.0)
                        .await;
                    (self.sink)(&RouterEvent::AttemptFailed {
                        backend: name.clone(),
                        timestamp: Instant::now(),
                        kind: send_err.kind,
                        message: send_err.message.clone(),
                    });
                    tracing::warn!(
                        backend = %name,
                        kind = send_err.kind.code(),
                        message = %send_err.message,
                        "backend attempt failed"
                    );

                    // A hard credential or provider failure is worth
                    // remembering for one availability TTL.
                    if matches!(send_err.kind, FailureKind::Auth | FailureKind::Fatal) {
                        self.availability.set(&name, false);
                    }

                    let retryable = send_err.is_retryable();
                    attempts.push(AttemptFailure {
                        backend: name.clone(),
                        kind: send_err.kind,
                        message: send_err.message.clone(),
                    });
                    if !retryable {
                        return Err(ClaudetteError::Backend {
                            backend: name,
                            kind: send_err.kind,
                            message: send_err.message,
                        });
                    }
                }
            }
        }

        Err(finalize_failure(attempts))
    }
}

/// Shapes the terminal error after the attempt loop ran dry.
///
/// A single real attempt keeps its backend attribution; circuit rejections
/// and multi-attempt runs aggregate into `AllBackendsFailed`.
fn finalize_failure(attempts: Vec<AttemptFailure>) -> ClaudetteError {
    if attempts.is_empty() {
        return ClaudetteError::NoBackendsAvailable;
    }
    if attempts.len() == 1 && attempts[0].kind != FailureKind::CircuitOpen {
        let failure = attempts.into_iter().next().expect("len checked");
        return ClaudetteError::Backend {
            backend: failure.backend,
            kind: failure.kind,
            message: failure.message,
        };
    }
    ClaudetteError::AllBackendsFailed { attempts }
}

/// Heuristic output-quality estimate feeding the rolling metrics.
fn estimate_quality(
    content_len: usize,
    tokens_in: u32,
    tokens_out: u32,
    latency: Duration,
    cost_eur: f64,
) -> f64 {
    let mut quality: f64 = 0.7;

    quality += if (50..2000).contains(&content_len) {
        0.1
    } else {
        0.05
    };

    if tokens_in > 0 {
        let ratio = f64::from(tokens_out) / f64::from(tokens_in);
        if (0.5..3.0).contains(&ratio) {
            quality += 0.1;
        }
    }

    if latency < Duration::from_secs(1) {
        quality += 0.05;
    } else if latency > Duration::from_secs(5) {
        quality -= 0.05;
    }

    if cost_eur < 0.01 {
        quality += 0.05;
    }

    quality.clamp(0.1, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use claudette_backend::{BackendResponse, CapabilityProfile};
    use claudette_core::{RequestOptions, SendError};
    use parking_lot::Mutex;

    /// Deterministic backend replaying a scripted sequence of outcomes.
    struct ScriptedBackend {
        name: String,
        profile: CapabilityProfile,
        cost_per_1k: f64,
        script: Mutex<Vec<Result<BackendResponse, SendError>>>,
        delay: Duration,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedBackend {
        fn new(name: &str, script: Vec<Result<BackendResponse, SendError>>) -> Self {
            Self {
                name: name.into(),
                profile: CapabilityProfile::openai(),
                cost_per_1k: 0.0001,
                script: Mutex::new(script),
                delay: Duration::from_millis(0),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn ok(content: &str) -> Result<BackendResponse, SendError> {
            Ok(BackendResponse {
                content: content.into(),
                tokens_input: Some(10),
                tokens_output: Some(20),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }
        fn model(&self) -> &str {
            "scripted"
        }
        fn profile(&self) -> &CapabilityProfile {
            &self.profile
        }
        async fn is_available(&self, _deadline: Duration) -> bool {
            true
        }
        fn estimate_cost(&self, tokens: u32) -> f64 {
            f64::from(tokens) / 1000.0 * self.cost_per_1k
        }
        fn latency_score(&self) -> f64 {
            0.5
        }
        async fn send(
            &self,
            _request: &ChatRequest,
            _deadline: Duration,
        ) -> Result<BackendResponse, SendError> {
            self.calls.lock().push(Instant::now());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut script = self.script.lock();
            if script.is_empty() {
                Self::ok("ok")
            } else {
                script.remove(0)
            }
        }
    }

    fn router_with(backends: Vec<Arc<ScriptedBackend>>) -> Router {
        let entries = backends
            .into_iter()
            .map(|b| (b as Arc<dyn Backend>, 1))
            .collect();
        let registry = Arc::new(BackendRegistry::new(entries).unwrap());
        Router::new(
            registry,
            Arc::new(AvailabilityCache::new(Duration::from_secs(60))),
            Arc::new(LedgerStore::disabled()),
            ScoringWeights::default(),
            RouterConfig {
                breaker: BreakerConfig::builder()
                    .failure_threshold(5)
                    .base_reset(Duration::from_millis(50))
                    .build(),
                ..Default::default()
            },
            crate::events::noop_sink(),
        )
    }

    #[tokio::test]
    async fn success_populates_response_fields() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![ScriptedBackend::ok("ok")]));
        let router = router_with(vec![Arc::clone(&b1)]);

        let response = router.route(&ChatRequest::new("hello")).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(response.backend_used, "b1");
        assert_eq!(response.tokens_input, 10);
        assert_eq!(response.tokens_output, 20);
        assert!(!response.cache_hit);
        assert!(response.metadata.contains_key("selection_reason"));
        assert_eq!(b1.call_count(), 1);
    }

    #[tokio::test]
    async fn rate_limit_falls_back_to_next_candidate() {
        let b1 = Arc::new(ScriptedBackend::new(
            "b1",
            vec![Err(SendError::new(FailureKind::RateLimit, "slow down"))],
        ));
        let b2 = Arc::new(ScriptedBackend::new("b2", vec![ScriptedBackend::ok("fine")]));
        let router = router_with(vec![Arc::clone(&b1), Arc::clone(&b2)]);

        let response = router.route(&ChatRequest::new("hello")).await.unwrap();
        assert_eq!(response.backend_used, "b2");
        assert_eq!(response.content, "fine");
        assert_eq!(b1.call_count(), 1);
        assert_eq!(b2.call_count(), 1);

        let snapshot = router.breaker("b1").unwrap().snapshot();
        assert_eq!(snapshot.failure_count, 1);
        let snapshot = router.breaker("b2").unwrap().snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.window_len, 1);
    }

    #[tokio::test]
    async fn auth_failure_aborts_immediately() {
        let b1 = Arc::new(ScriptedBackend::new(
            "b1",
            vec![Err(SendError::new(FailureKind::Auth, "bad key"))],
        ));
        let b2 = Arc::new(ScriptedBackend::new("b2", vec![ScriptedBackend::ok("unused")]));
        let router = router_with(vec![Arc::clone(&b1), Arc::clone(&b2)]);

        let err = router.route(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(
            err,
            ClaudetteError::Backend {
                kind: FailureKind::Auth,
                ..
            }
        ));
        assert_eq!(b2.call_count(), 0, "no fallback after a non-retryable kind");
    }

    #[tokio::test]
    async fn forced_backend_must_be_configured() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![]));
        let router = router_with(vec![b1]);

        let mut request = ChatRequest::new("hello");
        request.options.forced_backend = Some("ghost".into());
        let err = router.route(&request).await.unwrap_err();
        assert!(matches!(err, ClaudetteError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn forced_backend_cached_unhealthy_is_invalid_input() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![]));
        let router = router_with(vec![b1]);
        router.availability().set("b1", false);

        let mut request = ChatRequest::new("hello");
        request.options.forced_backend = Some("b1".into());
        let err = router.route(&request).await.unwrap_err();
        match err {
            ClaudetteError::InvalidInput(message) => {
                assert!(message.contains("not available"), "got: {message}")
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unhealthy_backends_are_pruned_from_the_candidate_set() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![ScriptedBackend::ok("from-b1")]));
        let b2 = Arc::new(ScriptedBackend::new("b2", vec![ScriptedBackend::ok("from-b2")]));
        let router = router_with(vec![Arc::clone(&b1), Arc::clone(&b2)]);
        router.availability().set("b1", false);

        let response = router.route(&ChatRequest::new("hello")).await.unwrap();
        assert_eq!(response.backend_used, "b2");
        assert_eq!(b1.call_count(), 0);
    }

    #[tokio::test]
    async fn open_circuit_on_forced_backend_yields_all_backends_failed() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![]));
        let router = router_with(vec![Arc::clone(&b1)]);

        // Trip the breaker with recorded failures.
        let breaker = router.breaker("b1").unwrap();
        for _ in 0..5 {
            breaker.try_acquire();
            breaker.record_failure(Duration::from_millis(1));
        }
        assert!(breaker.is_open());

        let mut request = ChatRequest::new("hello");
        request.options.forced_backend = Some("b1".into());
        let err = router.route(&request).await.unwrap_err();
        match err {
            ClaudetteError::AllBackendsFailed { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].kind, FailureKind::CircuitOpen);
            }
            other => panic!("expected AllBackendsFailed, got {other:?}"),
        }
        assert_eq!(b1.call_count(), 0);
    }

    #[tokio::test]
    async fn all_circuits_open_reports_circuit_open_causes() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![]));
        let router = router_with(vec![Arc::clone(&b1)]);
        let breaker = router.breaker("b1").unwrap();
        for _ in 0..5 {
            breaker.try_acquire();
            breaker.record_failure(Duration::from_millis(1));
        }

        let err = router.route(&ChatRequest::new("hello")).await.unwrap_err();
        match err {
            ClaudetteError::AllBackendsFailed { attempts } => {
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].kind, FailureKind::CircuitOpen);
                assert_eq!(attempts[0].backend, "b1");
            }
            other => panic!("expected AllBackendsFailed, got {other:?}"),
        }
        assert_eq!(b1.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_registry_is_no_backends_available() {
        let router = router_with(vec![]);
        let err = router.route(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ClaudetteError::NoBackendsAvailable));
    }

    #[tokio::test]
    async fn timeout_is_attributed_to_the_slow_backend() {
        let mut slow = ScriptedBackend::new("b1", vec![ScriptedBackend::ok("late")]);
        slow.delay = Duration::from_millis(400);
        let b1 = Arc::new(slow);
        let router = router_with(vec![Arc::clone(&b1)]);

        let mut request = ChatRequest::new("hello");
        request.options.timeout_ms = Some(50);
        let started = Instant::now();
        let err = router.route(&request).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(300));
        match err {
            ClaudetteError::Backend {
                backend,
                kind: FailureKind::Timeout,
                ..
            } => assert_eq!(backend, "b1"),
            other => panic!("expected Timeout, got {other:?}"),
        }
        let snapshot = router.breaker("b1").unwrap().snapshot();
        assert_eq!(snapshot.failure_count, 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded_by_three_backends() {
        let failing = |name: &str| {
            Arc::new(ScriptedBackend::new(
                name,
                vec![Err(SendError::new(FailureKind::Transient, "boom"))],
            ))
        };
        let backends: Vec<_> = ["b1", "b2", "b3", "b4"].into_iter().map(failing).collect();
        let router = router_with(backends.clone());

        let err = router.route(&ChatRequest::new("hello")).await.unwrap_err();
        match err {
            ClaudetteError::AllBackendsFailed { attempts } => assert_eq!(attempts.len(), 3),
            other => panic!("expected AllBackendsFailed, got {other:?}"),
        }
        let total_calls: usize = backends.iter().map(|b| b.call_count()).sum();
        assert_eq!(total_calls, 3, "at most one attempt per distinct backend");
    }

    #[tokio::test]
    async fn raw_mode_takes_the_first_backend_without_fallback() {
        let b1 = Arc::new(ScriptedBackend::new(
            "a-first",
            vec![Err(SendError::new(FailureKind::Transient, "boom"))],
        ));
        let b2 = Arc::new(ScriptedBackend::new("b-second", vec![ScriptedBackend::ok("x")]));
        let router = router_with(vec![Arc::clone(&b1), Arc::clone(&b2)]);

        let err = router.route_raw(&ChatRequest::new("hello")).await.unwrap_err();
        assert!(matches!(err, ClaudetteError::Backend { .. }));
        assert_eq!(b1.call_count(), 1);
        assert_eq!(b2.call_count(), 0, "raw mode never falls back");
    }

    #[tokio::test]
    async fn weights_update_is_atomic_replacement() {
        let b1 = Arc::new(ScriptedBackend::new("b1", vec![]));
        let router = router_with(vec![b1]);
        let before = router.weights();
        let new_weights = ScoringWeights::new(0.5, 0.2, 0.2, 0.05, 0.05).unwrap();
        router.update_weights(new_weights);
        assert_ne!(*router.weights(), *before);
    }

    #[test]
    fn quality_estimate_follows_the_formula() {
        // Mid-length content, sane ratio, fast, cheap.
        let q = estimate_quality(500, 100, 120, Duration::from_millis(300), 0.001);
        assert!((q - 1.0).abs() < 1e-9, "0.7+0.1+0.1+0.05+0.05 = 1.0, got {q}");

        // Tiny content, extreme ratio, slow, expensive.
        let q = estimate_quality(5, 100, 1000, Duration::from_secs(6), 0.5);
        assert!((q - 0.7).abs() < 1e-9, "0.7+0.05-0.05 = 0.7, got {q}");
    }

    #[test]
    fn quality_estimate_clamps() {
        let q = estimate_quality(0, 0, 0, Duration::from_secs(10), 1.0);
        assert!(q >= 0.1);
        let q = estimate_quality(500, 100, 120, Duration::ZERO, 0.0);
        assert!(q <= 1.0);
    }
}
