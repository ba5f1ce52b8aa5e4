//! End-to-end scenarios across the whole pipeline: orchestrator, cache,
//! router, breaker, and ledger, driven by deterministic mock backends.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use claudette::{ClaudetteError, FailureKind, RequestOptions};
use claudette_backend::CapabilityProfile;
use claudette_breaker::CircuitState;
use common::{claudette_with, test_config, MockBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn recent_window() -> chrono::DateTime<Utc> {
    Utc::now() - ChronoDuration::hours(1)
}

#[tokio::test]
async fn cache_hit_path_serves_the_second_request_from_cache() {
    let b1 = Arc::new(
        MockBackend::new("B1")
            .with_cost_per_1k(0.0001)
            .with_content("ok")
            .with_delay(Duration::from_millis(50)),
    );
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    let first = claudette
        .optimize("hello", &[], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(first.content, "ok");
    assert_eq!(first.backend_used, "B1");
    assert!(!first.cache_hit);
    assert!((first.cost_eur - 0.000_003).abs() < 1e-9);
    assert!(
        (40..500).contains(&first.latency_ms),
        "expected ≈50 ms, got {}",
        first.latency_ms
    );

    let second = claudette
        .optimize("hello", &[], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(second.content, "ok");
    assert_eq!(second.backend_used, "B1");
    assert!(second.cache_hit);
    assert!(
        second.latency_ms < first.latency_ms,
        "cache hit must be faster than the upstream call"
    );
    assert_eq!(b1.call_count(), 1, "second request never reaches the backend");

    let rows = claudette
        .store()
        .recent_quota(recent_window(), 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].cache_hit, "newest row is the cache hit");
    assert!(!rows[1].cache_hit);
}

#[tokio::test]
async fn forced_backend_that_is_unhealthy_is_rejected_without_a_ledger_row() {
    let b1 = Arc::new(MockBackend::new("B1"));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);
    claudette.router().availability().set("B1", false);

    let options = RequestOptions {
        forced_backend: Some("B1".into()),
        ..Default::default()
    };
    let err = claudette.optimize("hello", &[], options).await.unwrap_err();
    match &err {
        ClaudetteError::InvalidInput(message) => {
            assert!(message.contains("not available"), "got: {message}")
        }
        other => panic!("expected InvalidInput, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 2);
    assert_eq!(b1.call_count(), 0);

    let rows = claudette
        .store()
        .recent_quota(recent_window(), 10)
        .await
        .unwrap();
    assert!(rows.is_empty(), "rejected requests leave no ledger row");
}

#[tokio::test]
async fn rate_limited_backend_falls_back_to_the_next_candidate() {
    let b1 = Arc::new(MockBackend::new("B1").script(vec![MockBackend::fail(
        FailureKind::RateLimit,
        "retry later",
    )]));
    let b2 = Arc::new(MockBackend::new("B2").script(vec![MockBackend::ok("fine")]));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1), Arc::clone(&b2)]);

    let response = claudette
        .optimize("hello", &[], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.backend_used, "B2");
    assert_eq!(response.content, "fine");

    let b1_snapshot = claudette.router().breaker("B1").unwrap().snapshot();
    assert_eq!(b1_snapshot.failure_count, 1);
    let b2_snapshot = claudette.router().breaker("B2").unwrap().snapshot();
    assert_eq!(b2_snapshot.window_len, 1);
    assert_eq!(b2_snapshot.failure_count, 0);
}

#[tokio::test]
async fn breaker_trips_after_five_failures_and_recovers_through_half_open() {
    let script: Vec<_> = (0..5)
        .map(|_| MockBackend::fail(FailureKind::Transient, "flaky"))
        .chain([MockBackend::ok("recovered")])
        .collect();
    let b1 = Arc::new(MockBackend::new("B1").script(script));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    for attempt in 0..5 {
        let err = claudette
            .optimize(&format!("prompt {attempt}"), &[], RequestOptions::default())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                ClaudetteError::Backend {
                    kind: FailureKind::Transient,
                    ..
                }
            ),
            "attempt {attempt} should surface the transient failure, got {err:?}"
        );
    }
    let breaker = claudette.router().breaker("B1").unwrap();
    assert_eq!(breaker.state(), CircuitState::Open);

    // Within the reset window the circuit rejects without calling upstream.
    let calls_before = b1.call_count();
    let err = claudette
        .optimize("prompt blocked", &[], RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        ClaudetteError::AllBackendsFailed { attempts } => {
            assert!(attempts.iter().any(|a| a.kind == FailureKind::CircuitOpen));
        }
        other => panic!("expected AllBackendsFailed, got {other:?}"),
    }
    assert_eq!(b1.call_count(), calls_before);

    // After the reset the next request probes half-open and closes.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let response = claudette
        .optimize("prompt recovered", &[], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.content, "recovered");
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.snapshot().window_len, 0, "window cleared on close");
}

#[tokio::test]
async fn chinese_code_prompt_selects_the_specialized_backend() {
    let openai_like = Arc::new(
        MockBackend::new("OpenAI-like").with_profile(CapabilityProfile::openai()),
    );
    let qwen_like = Arc::new(MockBackend::new("Qwen-like").with_profile(CapabilityProfile::qwen()));
    let claudette = claudette_with(
        test_config(),
        vec![Arc::clone(&openai_like), Arc::clone(&qwen_like)],
    );

    let response = claudette
        .optimize("写一个 Python 函数反转字符串", &[], RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(response.backend_used, "Qwen-like");

    let reason = response
        .metadata
        .get("selection_reason")
        .and_then(|v| v.as_str())
        .expect("selection rationale attached");
    assert!(reason.contains("task=code"), "got: {reason}");
    assert!(reason.contains("lang=zh"), "got: {reason}");
    assert_eq!(openai_like.call_count(), 0);
}

#[tokio::test]
async fn deadline_is_enforced_and_attributed() {
    let b1 = Arc::new(MockBackend::new("B1").with_delay(Duration::from_secs(10)));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    let options = RequestOptions {
        timeout_ms: Some(2000),
        ..Default::default()
    };
    let started = Instant::now();
    let err = claudette.optimize("hello", &[], options).await.unwrap_err();
    assert!(
        started.elapsed() <= Duration::from_millis(2500),
        "deadline overshoot: {:?}",
        started.elapsed()
    );
    match err {
        ClaudetteError::Backend {
            backend,
            kind: FailureKind::Timeout,
            ..
        } => assert_eq!(backend, "B1"),
        other => panic!("expected a Timeout attributed to B1, got {other:?}"),
    }

    let snapshot = claudette.router().breaker("B1").unwrap().snapshot();
    assert_eq!(snapshot.failure_count, 1, "timeouts count as breaker failures");
}

#[tokio::test]
async fn raw_mode_bypasses_cache_and_scoring() {
    let b1 = Arc::new(MockBackend::new("B1").with_content("raw answer"));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    let raw = RequestOptions {
        bypass_optimization: true,
        ..Default::default()
    };
    let first = claudette.optimize("hello", &[], raw.clone()).await.unwrap();
    assert_eq!(first.content, "raw answer");
    let second = claudette.optimize("hello", &[], raw).await.unwrap();
    assert!(!second.cache_hit, "raw mode never consults the cache");
    assert_eq!(b1.call_count(), 2);
}

#[tokio::test]
async fn cache_bypass_still_inserts_for_later_requests() {
    let b1 = Arc::new(MockBackend::new("B1"));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    let bypass = RequestOptions {
        bypass_cache: true,
        ..Default::default()
    };
    claudette.optimize("hello", &[], bypass).await.unwrap();
    let follow_up = claudette
        .optimize("hello", &[], RequestOptions::default())
        .await
        .unwrap();
    assert!(
        follow_up.cache_hit,
        "a bypassed lookup still populates the cache for later requests"
    );
    assert_eq!(b1.call_count(), 1);
}

#[tokio::test]
async fn empty_prompt_is_invalid_input() {
    let claudette = claudette_with(test_config(), vec![Arc::new(MockBackend::new("B1"))]);
    let err = claudette
        .optimize("   ", &[], RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClaudetteError::InvalidInput(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn traversal_file_paths_are_rejected() {
    let claudette = claudette_with(test_config(), vec![Arc::new(MockBackend::new("B1"))]);
    let err = claudette
        .optimize(
            "summarize",
            &["../etc/passwd".to_string()],
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClaudetteError::InvalidInput(_)));
}

#[tokio::test]
async fn unreadable_files_warn_but_only_fail_when_all_do() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("notes.txt");
    std::fs::write(&good, "important context").unwrap();

    let b1 = Arc::new(MockBackend::new("B1"));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    // One readable, one missing: proceeds.
    let response = claudette
        .optimize(
            "summarize",
            &[
                good.to_string_lossy().into_owned(),
                dir.path().join("missing.txt").to_string_lossy().into_owned(),
            ],
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(response.backend_used, "B1");

    // All missing: rejected.
    let err = claudette
        .optimize(
            "summarize",
            &[dir.path().join("gone.txt").to_string_lossy().into_owned()],
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClaudetteError::InvalidInput(_)));
}

#[tokio::test]
async fn status_report_covers_backends_cache_and_ledger() {
    let b1 = Arc::new(MockBackend::new("B1"));
    let claudette = claudette_with(test_config(), vec![Arc::clone(&b1)]);

    claudette
        .optimize("hello", &[], RequestOptions::default())
        .await
        .unwrap();
    claudette.probe_backends().await;

    let report = claudette.get_status().await;
    assert!(report.healthy());
    assert!(report.storage_enabled);
    assert_eq!(report.backends.len(), 1);
    assert_eq!(report.backends[0].name, "B1");
    assert_eq!(report.backends[0].available, Some(true));
    assert_eq!(report.backends[0].breaker_state, "closed");
    assert_eq!(report.backends[0].total_requests, 1);
    assert_eq!(report.cache.entries, 1);
    assert_eq!(report.usage_today.as_ref().map(|u| u.requests), Some(1));

    claudette.cleanup().await;
}
