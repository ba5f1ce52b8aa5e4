//! Deterministic request fingerprinting.
//!
//! The fingerprint covers exactly the inputs that can change the produced
//! response: the prompt, the attached file contents (order-independent), and
//! the output-affecting options. Everything else (deadlines, cache flags) is
//! deliberately excluded so that equivalent requests share a cache key.

use crate::request::{ChatRequest, FileContext, RequestOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 request fingerprint in lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the cache key for a request.
///
/// File contents are hashed in path order so attachment order does not
/// produce distinct keys. Each field is length-prefixed to keep adjacent
/// fields from aliasing.
pub fn fingerprint(request: &ChatRequest) -> Fingerprint {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, b"prompt", request.prompt.as_bytes());

    let mut files: Vec<&FileContext> = request.files.iter().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    for file in files {
        update_field(&mut hasher, b"file-path", file.path.as_bytes());
        update_field(&mut hasher, b"file-content", file.content.as_bytes());
    }

    let RequestOptions {
        forced_backend,
        model,
        max_tokens,
        temperature,
        ..
    } = &request.options;
    update_opt(&mut hasher, b"model", model.as_deref().map(str::as_bytes));
    update_opt(
        &mut hasher,
        b"backend",
        forced_backend.as_deref().map(str::as_bytes),
    );
    let max_tokens = max_tokens.map(|n| n.to_string());
    update_opt(&mut hasher, b"max-tokens", max_tokens.as_deref().map(str::as_bytes));
    // Fixed formatting keeps 0.7f32 stable across platforms.
    let temperature = temperature.map(|t| format!("{t:.4}"));
    update_opt(
        &mut hasher,
        b"temperature",
        temperature.as_deref().map(str::as_bytes),
    );

    Fingerprint(hex(&hasher.finalize()))
}

/// SHA-256 of the prompt alone, stored alongside ledger rows for grouping.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex(&hasher.finalize())
}

fn update_field(hasher: &mut Sha256, tag: &[u8], value: &[u8]) {
    hasher.update(tag);
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

fn update_opt(hasher: &mut Sha256, tag: &[u8], value: Option<&[u8]>) {
    match value {
        Some(v) => update_field(hasher, tag, v),
        None => {
            hasher.update(tag);
            hasher.update(u64::MAX.to_le_bytes());
        }
    }
}

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
