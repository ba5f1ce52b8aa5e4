//! Circuit state machine internals.

use crate::config::BreakerConfig;
use crate::events::{BreakerEvent, BreakerSink};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Represents the state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// The circuit is closed and calls are allowed.
    Closed,
    /// The circuit is open and calls are rejected.
    Open,
    /// The circuit is half-open and a limited number of probes are allowed.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

/// Which trigger opened the circuit.
///
/// When the failure rate and the slow-call rate trip simultaneously the
/// failure rate takes precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenReason {
    ConsecutiveFailures,
    FailureRate,
    SlowCallRate,
}

/// One recorded call outcome.
#[derive(Debug, Clone, Copy)]
pub struct CallOutcome {
    pub success: bool,
    pub duration: Duration,
}

impl CallOutcome {
    pub fn success(duration: Duration) -> Self {
        Self {
            success: true,
            duration,
        }
    }

    pub fn failure(duration: Duration) -> Self {
        Self {
            success: false,
            duration,
        }
    }
}

/// Point-in-time view of the breaker internals.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub window_len: usize,
    pub failure_count: usize,
    pub slow_call_count: usize,
    pub failure_rate: f64,
    pub slow_call_rate: f64,
    pub time_since_state_change: Duration,
}

pub(crate) struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    window: VecDeque<CallOutcome>,
    opened_at: Option<Instant>,
    half_open_inflight: usize,
    last_state_change: Instant,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            window: VecDeque::new(),
            opened_at: None,
            half_open_inflight: 0,
            last_state_change: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn try_acquire(
        &mut self,
        name: &str,
        config: &BreakerConfig,
        sink: &BreakerSink,
    ) -> bool {
        match self.state {
            CircuitState::Closed => {
                sink(&BreakerEvent::CallPermitted {
                    backend: name.to_string(),
                    timestamp: Instant::now(),
                    state: self.state,
                });
                true
            }
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= config.reset_duration(self.consecutive_failures) {
                    self.transition_to(CircuitState::HalfOpen, None, name, sink);
                    self.half_open_inflight = 1;
                    sink(&BreakerEvent::CallPermitted {
                        backend: name.to_string(),
                        timestamp: Instant::now(),
                        state: self.state,
                    });
                    true
                } else {
                    sink(&BreakerEvent::CallRejected {
                        backend: name.to_string(),
                        timestamp: Instant::now(),
                    });
                    false
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_inflight < config.half_open_max_calls {
                    self.half_open_inflight += 1;
                    sink(&BreakerEvent::CallPermitted {
                        backend: name.to_string(),
                        timestamp: Instant::now(),
                        state: self.state,
                    });
                    true
                } else {
                    sink(&BreakerEvent::CallRejected {
                        backend: name.to_string(),
                        timestamp: Instant::now(),
                    });
                    false
                }
            }
        }
    }

    pub(crate) fn record(
        &mut self,
        name: &str,
        config: &BreakerConfig,
        sink: &BreakerSink,
        outcome: CallOutcome,
    ) {
        if outcome.duration >= config.slow_call_threshold {
            sink(&BreakerEvent::SlowCallDetected {
                backend: name.to_string(),
                timestamp: Instant::now(),
                duration: outcome.duration,
            });
            #[cfg(feature = "metrics")]
            metrics::counter!("claudette_breaker_slow_calls_total", "backend" => name.to_string())
                .increment(1);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "claudette_breaker_calls_total",
            "backend" => name.to_string(),
            "outcome" => if outcome.success { "success" } else { "failure" }
        )
        .increment(1);

        if self.state == CircuitState::HalfOpen {
            self.half_open_inflight = self.half_open_inflight.saturating_sub(1);
            if outcome.success {
                self.transition_to(CircuitState::Closed, None, name, sink);
            } else {
                self.consecutive_failures += 1;
                self.transition_to(
                    CircuitState::Open,
                    Some(OpenReason::ConsecutiveFailures),
                    name,
                    sink,
                );
            }
            return;
        }

        self.window.push_back(outcome);
        while self.window.len() > config.window_size {
            self.window.pop_front();
        }

        if outcome.success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }

        if self.state == CircuitState::Closed {
            if let Some(reason) = self.evaluate(config) {
                self.transition_to(CircuitState::Open, Some(reason), name, sink);
            }
        }
    }

    /// Checks the open triggers. Consecutive failures dominate; between the
    /// rate triggers, failure rate takes precedence over slow-call rate.
    fn evaluate(&self, config: &BreakerConfig) -> Option<OpenReason> {
        if self.consecutive_failures >= config.failure_threshold {
            return Some(OpenReason::ConsecutiveFailures);
        }
        if self.window.len() * 2 >= config.window_size {
            let total = self.window.len() as f64;
            let failures = self.window.iter().filter(|o| !o.success).count();
            let slow = self
                .window
                .iter()
                .filter(|o| o.duration >= config.slow_call_threshold)
                .count();
            if failures as f64 / total >= config.failure_rate_threshold {
                return Some(OpenReason::FailureRate);
            }
            if slow as f64 / total >= config.slow_call_rate_threshold {
                return Some(OpenReason::SlowCallRate);
            }
        }
        None
    }

    /// Side-effect-free check of whether a call would currently be admitted.
    /// Unlike `try_acquire` this neither transitions state nor reserves a
    /// probe slot, so the candidate filter can use it safely.
    pub(crate) fn would_permit(&self, config: &BreakerConfig) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                elapsed >= config.reset_duration(self.consecutive_failures)
            }
            CircuitState::HalfOpen => self.half_open_inflight < config.half_open_max_calls,
        }
    }

    pub(crate) fn force_closed(&mut self, name: &str, sink: &BreakerSink) {
        self.transition_to(CircuitState::Closed, None, name, sink);
    }

    pub(crate) fn snapshot(&self, config: &BreakerConfig) -> BreakerSnapshot {
        let total = self.window.len();
        let failure_count = self.window.iter().filter(|o| !o.success).count();
        let slow_call_count = self
            .window
            .iter()
            .filter(|o| o.duration >= config.slow_call_threshold)
            .count();
        let failure_rate = if total > 0 {
            failure_count as f64 / total as f64
        } else {
            0.0
        };
        let slow_call_rate = if total > 0 {
            slow_call_count as f64 / total as f64
        } else {
            0.0
        };
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            window_len: total,
            failure_count,
            slow_call_count,
            failure_rate,
            slow_call_rate,
            time_since_state_change: self.last_state_change.elapsed(),
        }
    }

    fn transition_to(
        &mut self,
        state: CircuitState,
        reason: Option<OpenReason>,
        name: &str,
        sink: &BreakerSink,
    ) {
        if self.state == state {
            return;
        }
        let from_state = self.state;

        sink(&BreakerEvent::StateTransition {
            backend: name.to_string(),
            timestamp: Instant::now(),
            from_state,
            to_state: state,
            reason,
        });

        #[cfg(feature = "tracing")]
        tracing::info!(
            backend = name,
            from = from_state.as_str(),
            to = state.as_str(),
            ?reason,
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "claudette_breaker_transitions_total",
                "backend" => name.to_string(),
                "from" => from_state.as_str(),
                "to" => state.as_str()
            )
            .increment(1);
            metrics::gauge!("claudette_breaker_state", "backend" => name.to_string()).set(
                match state {
                    CircuitState::Closed => 0.0,
                    CircuitState::Open => 1.0,
                    CircuitState::HalfOpen => 2.0,
                },
            );
        }

        self.state = state;
        self.last_state_change = Instant::now();
        match state {
            CircuitState::Open => {
                self.opened_at = Some(Instant::now());
                self.half_open_inflight = 0;
            }
            CircuitState::HalfOpen => {
                self.window.clear();
                self.half_open_inflight = 0;
            }
            CircuitState::Closed => {
                self.window.clear();
                self.consecutive_failures = 0;
                self.opened_at = None;
                self.half_open_inflight = 0;
            }
        }
    }
}
