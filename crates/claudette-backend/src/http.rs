//! Shared HTTP plumbing: pooled client construction and the mapping from
//! wire-level failures to the typed error kinds.

use claudette_core::{FailureKind, SendError};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Connection pool bounds for the process-wide client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 8,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Builds the shared `reqwest` client every provider reuses.
///
/// Per-request deadlines are applied at call sites; only the connect timeout
/// and pool bounds live here.
pub fn build_client(settings: &HttpSettings) -> Result<Client, SendError> {
    Client::builder()
        .connect_timeout(settings.connect_timeout)
        .pool_max_idle_per_host(settings.pool_max_idle_per_host)
        .pool_idle_timeout(settings.pool_idle_timeout)
        .build()
        .map_err(|e| SendError::new(FailureKind::Fatal, format!("http client init: {e}")))
}

/// Maps an HTTP error status plus response body to a typed send error.
pub fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> SendError {
    let summary = summarize_body(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SendError::new(
            FailureKind::Auth,
            format!("{status}: {summary}"),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            let mut err = SendError::new(FailureKind::RateLimit, format!("{status}: {summary}"));
            if let Some(delay) = retry_after {
                err = err.with_retry_after(delay);
            }
            err
        }
        StatusCode::REQUEST_TIMEOUT => {
            SendError::new(FailureKind::Timeout, format!("{status}: {summary}"))
        }
        StatusCode::BAD_REQUEST if is_context_length(body) => SendError::new(
            FailureKind::ContextLength,
            format!("{status}: {summary}"),
        ),
        s if s.is_server_error() => {
            SendError::new(FailureKind::Transient, format!("{status}: {summary}"))
        }
        _ => SendError::new(FailureKind::Fatal, format!("{status}: {summary}")),
    }
}

/// Maps a transport-level `reqwest` error to a typed send error.
pub fn classify_transport(err: &reqwest::Error) -> SendError {
    if err.is_timeout() {
        SendError::new(FailureKind::Timeout, err.to_string())
    } else if err.is_connect() || err.is_request() {
        SendError::new(FailureKind::Transient, err.to_string())
    } else {
        SendError::new(FailureKind::Fatal, err.to_string())
    }
}

/// Parses a `Retry-After` header value in seconds.
pub fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn is_context_length(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("context_length")
        || lower.contains("context length")
        || lower.contains("maximum context")
        || lower.contains("prompt is too long")
}

fn summarize_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let mut end = MAX;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "", None).kind,
            FailureKind::Auth
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "", None).kind,
            FailureKind::RateLimit
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "", None).kind,
            FailureKind::Transient
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST, "oops", None).kind,
            FailureKind::Fatal
        );
    }

    #[test]
    fn context_length_detected_in_400_body() {
        let err = classify_status(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":"context_length_exceeded"}}"#,
            None,
        );
        assert_eq!(err.kind, FailureKind::ContextLength);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            "",
            Some(Duration::from_secs(7)),
        );
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, &body, None);
        assert!(err.message.len() < 300);
    }
}
