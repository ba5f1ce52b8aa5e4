//! Canonical request model and input validation.

use crate::error::ClaudetteError;
use crate::DEFAULT_REQUEST_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum accepted prompt size in bytes.
pub const MAX_PROMPT_BYTES: usize = 1024 * 1024;

/// Maximum number of context files attached to one request.
pub const MAX_FILES: usize = 100;

/// Caller-supplied routing and generation preferences.
///
/// Every field is optional; the zero value routes a plain request through the
/// full pipeline with the default deadline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Force routing to a single named backend, bypassing scoring.
    pub forced_backend: Option<String>,
    /// Override the backend's configured model.
    pub model: Option<String>,
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: Option<f32>,
    /// Skip the cache lookup (the response is still inserted).
    #[serde(default)]
    pub bypass_cache: bool,
    /// Raw mode: one attempt against the highest-priority backend, no
    /// scoring, no cache lookup, no fallback.
    #[serde(default)]
    pub bypass_optimization: bool,
    /// Whole-request deadline in milliseconds. Defaults to 45 000.
    pub timeout_ms: Option<u64>,
}

impl RequestOptions {
    /// The effective whole-request deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }
}

/// One attached file, already read into memory by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContext {
    /// Path as supplied by the caller, used for the context header.
    pub path: String,
    /// Full file contents.
    pub content: String,
}

/// A validated request ready for routing.
///
/// File contents have been resolved before construction; backends only ever
/// see the combined [`ChatRequest::context_prompt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub files: Vec<FileContext>,
    pub options: RequestOptions,
}

impl ChatRequest {
    /// Builds a request from a bare prompt with default options.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            files: Vec::new(),
            options: RequestOptions::default(),
        }
    }

    /// Checks the input constraints: non-empty prompt within the size
    /// bound, a bounded file count, and a temperature inside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ClaudetteError> {
        if self.prompt.trim().is_empty() {
            return Err(ClaudetteError::InvalidInput("prompt must not be empty".into()));
        }
        if self.prompt.len() > MAX_PROMPT_BYTES {
            return Err(ClaudetteError::InvalidInput(format!(
                "prompt exceeds {} bytes",
                MAX_PROMPT_BYTES
            )));
        }
        if self.files.len() > MAX_FILES {
            return Err(ClaudetteError::InvalidInput(format!(
                "too many context files ({} > {})",
                self.files.len(),
                MAX_FILES
            )));
        }
        if let Some(t) = self.options.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(ClaudetteError::InvalidInput(format!(
                    "temperature {t} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// The full prompt sent upstream: each file prefixed with a
    /// `File: <path>` header, then the user prompt.
    pub fn context_prompt(&self) -> String {
        if self.files.is_empty() {
            return self.prompt.clone();
        }
        let mut out = String::with_capacity(self.total_input_chars() + self.files.len() * 16);
        for file in &self.files {
            out.push_str("File: ");
            out.push_str(&file.path);
            out.push('\n');
            out.push_str(&file.content);
            out.push_str("\n\n");
        }
        out.push_str(&self.prompt);
        out
    }

    /// Character count of prompt plus attached file contents.
    pub fn total_input_chars(&self) -> usize {
        self.prompt.len() + self.files.iter().map(|f| f.content.len()).sum::<usize>()
    }

    /// Rough token estimate at four characters per token, rounded up.
    pub fn estimated_tokens(&self) -> u32 {
        (self.total_input_chars() as u32).div_ceil(4)
    }
}

/// Rejects file paths that escape the caller's working tree.
///
/// `..` components and `~` expansion are refused outright; everything else is
/// left to the filesystem.
pub fn validate_path(path: &str) -> Result<(), ClaudetteError> {
    if path.contains("..") || path.starts_with('~') {
        return Err(ClaudetteError::InvalidInput(format!(
            "path {path:?} is not allowed"
        )));
    }
    Ok(())
}
