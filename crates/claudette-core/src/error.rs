//! Error taxonomy shared by every claudette subsystem.
//!
//! Each kind carries a stable code for programmatic handling; backend-born
//! failures keep their backend attribution all the way to the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Classification of a single failed backend attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Synthetic rejection by the circuit breaker. Counts as a failure for
    /// scheduling but is never attributed to the backend itself.
    CircuitOpen,
    /// Upstream rate limiting.
    RateLimit,
    /// The deadline elapsed before the backend answered.
    Timeout,
    /// Credentials rejected.
    Auth,
    /// The prompt exceeded the provider's context window.
    ContextLength,
    /// A transient upstream or transport problem.
    Transient,
    /// Unrecoverable provider error.
    Fatal,
}

impl FailureKind {
    /// Whether the router may fall back to another backend after this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureKind::CircuitOpen
                | FailureKind::RateLimit
                | FailureKind::Timeout
                | FailureKind::Transient
        )
    }

    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::CircuitOpen => "CIRCUIT_OPEN",
            FailureKind::RateLimit => "RATE_LIMIT",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::Auth => "AUTH",
            FailureKind::ContextLength => "CONTEXT_LENGTH",
            FailureKind::Transient => "TRANSIENT",
            FailureKind::Fatal => "FATAL",
        }
    }
}

/// One entry in the cause list of [`ClaudetteError::AllBackendsFailed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub backend: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Typed error returned by a backend `send`.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct SendError {
    pub kind: FailureKind,
    pub message: String,
    /// Upstream-suggested pause before retrying, when the provider sent one.
    pub retry_after: Option<Duration>,
}

impl SendError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Top-level error surface of the middleware.
#[derive(Debug, Clone, Error)]
pub enum ClaudetteError {
    /// The request violated an input constraint.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The candidate set was empty before the first attempt.
    #[error("no backends available")]
    NoBackendsAvailable,

    /// A single backend failed with a non-retryable kind.
    #[error("backend {backend} failed ({}): {message}", kind.code())]
    Backend {
        backend: String,
        kind: FailureKind,
        message: String,
    },

    /// Every attempted backend failed; carries the per-attempt causes.
    #[error("all backends failed after {} attempt(s)", attempts.len())]
    AllBackendsFailed { attempts: Vec<AttemptFailure> },

    /// The response cache is unreachable. The orchestrator downgrades this
    /// to a warning and proceeds as a miss.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The quota ledger is unreachable. Downgraded to a warning as well.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
}

impl ClaudetteError {
    /// Stable machine-readable code for the CLI and structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            ClaudetteError::InvalidInput(_) => "INVALID_INPUT",
            ClaudetteError::NoBackendsAvailable => "NO_BACKENDS_AVAILABLE",
            ClaudetteError::Backend { kind, .. } => kind.code(),
            ClaudetteError::AllBackendsFailed { .. } => "ALL_BACKENDS_FAILED",
            ClaudetteError::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
            ClaudetteError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
        }
    }

    /// Whether retrying the whole request might succeed.
    ///
    /// For the aggregate case this reflects whether at least one cause was
    /// retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClaudetteError::InvalidInput(_) | ClaudetteError::NoBackendsAvailable => false,
            ClaudetteError::Backend { kind, .. } => kind.is_retryable(),
            ClaudetteError::AllBackendsFailed { attempts } => {
                attempts.iter().any(|a| a.kind.is_retryable())
            }
            ClaudetteError::CacheUnavailable(_) | ClaudetteError::LedgerUnavailable(_) => true,
        }
    }

    /// Process exit code mapping: 2 invalid arguments, 3 network/API,
    /// 4 timeout, 5 authentication, 1 everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClaudetteError::InvalidInput(_) => 2,
            ClaudetteError::Backend { kind, .. } => match kind {
                FailureKind::Timeout => 4,
                FailureKind::Auth => 5,
                _ => 3,
            },
            ClaudetteError::NoBackendsAvailable | ClaudetteError::AllBackendsFailed { .. } => 3,
            ClaudetteError::CacheUnavailable(_) | ClaudetteError::LedgerUnavailable(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_by_kind() {
        assert!(FailureKind::RateLimit.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::CircuitOpen.is_retryable());
        assert!(!FailureKind::Auth.is_retryable());
        assert!(!FailureKind::ContextLength.is_retryable());
        assert!(!FailureKind::Fatal.is_retryable());
    }

    #[test]
    fn aggregate_retryability_reflects_causes() {
        let err = ClaudetteError::AllBackendsFailed {
            attempts: vec![
                AttemptFailure {
                    backend: "a".into(),
                    kind: FailureKind::Auth,
                    message: "bad key".into(),
                },
                AttemptFailure {
                    backend: "b".into(),
                    kind: FailureKind::RateLimit,
                    message: "slow down".into(),
                },
            ],
        };
        assert!(err.is_retryable());

        let err = ClaudetteError::AllBackendsFailed {
            attempts: vec![AttemptFailure {
                backend: "a".into(),
                kind: FailureKind::Fatal,
                message: "boom".into(),
            }],
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ClaudetteError::InvalidInput("x".into()).exit_code(), 2);
        assert_eq!(
            ClaudetteError::Backend {
                backend: "b".into(),
                kind: FailureKind::Timeout,
                message: "late".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            ClaudetteError::Backend {
                backend: "b".into(),
                kind: FailureKind::Auth,
                message: "denied".into()
            }
            .exit_code(),
            5
        );
        assert_eq!(ClaudetteError::NoBackendsAvailable.exit_code(), 3);
    }
}
