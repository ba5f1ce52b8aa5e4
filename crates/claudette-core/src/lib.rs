//! Core infrastructure for claudette.
//!
//! This crate provides the shared vocabulary used across all claudette
//! subsystems:
//! - Canonical request/response model with input validation
//! - Error taxonomy with stable codes and retryability
//! - Request fingerprinting for the response cache
//! - Credential masking for every rendering surface

pub mod error;
pub mod fingerprint;
pub mod mask;
pub mod request;
pub mod response;

pub use error::{AttemptFailure, ClaudetteError, FailureKind, SendError};
pub use fingerprint::{fingerprint, prompt_hash, Fingerprint};
pub use mask::mask_secret;
pub use request::{ChatRequest, FileContext, RequestOptions};
pub use response::ChatResponse;

/// Default whole-request deadline in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 45_000;
