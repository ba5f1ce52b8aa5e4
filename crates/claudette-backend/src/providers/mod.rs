//! Built-in provider implementations.

mod anthropic;
mod ollama;
mod openai;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::profile::CapabilityProfile;
use crate::Backend;
use reqwest::Client;
use std::str::FromStr;
use std::sync::Arc;

/// Which wire dialect a configured backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI-style `/chat/completions`.
    OpenAi,
    /// Anthropic `/v1/messages`.
    Anthropic,
    /// Qwen endpoints speaking the OpenAI-compatible dialect.
    Qwen,
    /// Local Ollama daemon.
    Ollama,
}

impl ProviderKind {
    /// Guesses the dialect from a backend name when the configuration does
    /// not state one. `claude-*` names map to Anthropic, `qwen-*` to Qwen,
    /// `ollama`/`local-*` to Ollama, everything else to OpenAI-style.
    pub fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("claude") || lower.contains("anthropic") {
            ProviderKind::Anthropic
        } else if lower.contains("qwen") {
            ProviderKind::Qwen
        } else if lower.contains("ollama") || lower.contains("local") {
            ProviderKind::Ollama
        } else {
            ProviderKind::OpenAi
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Qwen => "qwen",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// The capability profile shipped for this dialect.
    pub fn default_profile(self) -> CapabilityProfile {
        match self {
            ProviderKind::OpenAi => CapabilityProfile::openai(),
            ProviderKind::Anthropic => CapabilityProfile::anthropic(),
            ProviderKind::Qwen => CapabilityProfile::qwen(),
            ProviderKind::Ollama => CapabilityProfile::ollama(),
        }
    }

    /// The well-known base URL for this dialect.
    pub fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com",
            ProviderKind::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            ProviderKind::Ollama => "http://localhost:11434",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" | "claude" => Ok(ProviderKind::Anthropic),
            "qwen" => Ok(ProviderKind::Qwen),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider kind {other:?}")),
        }
    }
}

/// Resolved settings for constructing one backend.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub cost_per_1k_tokens: f64,
}

impl BackendSettings {
    /// Fills the base URL from the provider default when empty.
    pub fn effective_base_url(&self) -> String {
        if self.base_url.trim().is_empty() {
            self.provider.default_base_url().to_string()
        } else {
            self.base_url.trim_end_matches('/').to_string()
        }
    }
}

/// Constructs a backend for the settings, sharing the given HTTP client.
pub fn build_backend(settings: BackendSettings, client: Client) -> Arc<dyn Backend> {
    let profile = settings.provider.default_profile();
    match settings.provider {
        ProviderKind::OpenAi | ProviderKind::Qwen => {
            Arc::new(OpenAiBackend::new(settings, profile, client))
        }
        ProviderKind::Anthropic => Arc::new(AnthropicBackend::new(settings, profile, client)),
        ProviderKind::Ollama => Arc::new(OllamaBackend::new(settings, profile, client)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_inference_by_name() {
        assert_eq!(ProviderKind::infer("claude-sonnet"), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::infer("qwen-coder"), ProviderKind::Qwen);
        assert_eq!(ProviderKind::infer("ollama"), ProviderKind::Ollama);
        assert_eq!(ProviderKind::infer("gpt-backend"), ProviderKind::OpenAi);
    }

    #[test]
    fn empty_base_url_falls_back_to_default() {
        let settings = BackendSettings {
            name: "qwen".into(),
            provider: ProviderKind::Qwen,
            model: "qwen-max".into(),
            base_url: String::new(),
            api_key: None,
            cost_per_1k_tokens: 0.0004,
        };
        assert!(settings.effective_base_url().starts_with("https://dashscope"));
    }
}
