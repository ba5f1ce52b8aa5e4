//! Configuration: serde-backed file loading, environment overlay, and the
//! masked effective view.

use claudette_backend::ProviderKind;
use claudette_breaker::BreakerConfig;
use claudette_core::ClaudetteError;
use claudette_router::ScoringWeights;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable forcing the storage-less mode for tests.
pub const ENV_IN_MEMORY: &str = "CLAUDETTE_IN_MEMORY";
/// Environment variable overriding the storage directory.
pub const ENV_DB_DIR: &str = "CLAUDETTE_DB_DIR";
/// Environment variable overriding the request timeout profile.
pub const ENV_TIMEOUT_MS: &str = "CLAUDETTE_TIMEOUT_MS";

/// One configured backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower number = tried earlier in raw mode and priority ordering.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_ref: Option<String>,
    /// Wire dialect override; inferred from the backend name when absent.
    #[serde(default)]
    pub provider: Option<String>,
}

impl BackendConfig {
    /// Resolves the wire dialect, falling back to name-based inference.
    pub fn provider_kind(&self, name: &str) -> Result<ProviderKind, ClaudetteError> {
        match &self.provider {
            Some(raw) => raw
                .parse()
                .map_err(|e: String| ClaudetteError::InvalidInput(e)),
            None => Ok(ProviderKind::infer(name)),
        }
    }
}

/// Feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub caching: bool,
    pub cost_optimization: bool,
    pub performance_monitoring: bool,
    pub smart_routing: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            caching: true,
            cost_optimization: true,
            performance_monitoring: true,
            smart_routing: true,
        }
    }
}

/// Numeric limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub cache_ttl_s: u64,
    pub max_cache_size: u64,
    pub cost_warning_eur: f64,
    pub max_context_tokens: u32,
    pub request_timeout_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cache_ttl_s: 3600,
            max_cache_size: 10_000,
            cost_warning_eur: 0.10,
            max_context_tokens: 128_000,
            request_timeout_ms: 45_000,
        }
    }
}

/// Router-level options.
///
/// The three mix weights are accepted and validated for compatibility with
/// older configurations; candidate ranking itself uses the five-factor
/// scorer weights. `fallback_enabled = false` limits every request to a
/// single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    pub cost_weight: f64,
    pub latency_weight: f64,
    pub availability_weight: f64,
    pub fallback_enabled: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            cost_weight: 0.4,
            latency_weight: 0.4,
            availability_weight: 0.2,
            fallback_enabled: true,
        }
    }
}

/// Circuit-breaker knobs. Rate thresholds are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerOptions {
    pub failure_threshold: u32,
    pub base_reset_ms: u64,
    pub half_open_max_calls: usize,
    pub failure_rate_threshold: f64,
    pub slow_call_threshold_ms: u64,
    pub slow_call_rate_threshold: f64,
    pub window_size: usize,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_reset_ms: 30_000,
            half_open_max_calls: 3,
            failure_rate_threshold: 50.0,
            slow_call_threshold_ms: 15_000,
            slow_call_rate_threshold: 80.0,
            window_size: 20,
        }
    }
}

impl CircuitBreakerOptions {
    pub fn to_breaker_config(self) -> BreakerConfig {
        BreakerConfig::builder()
            .failure_threshold(self.failure_threshold)
            .window_size(self.window_size)
            .failure_rate_threshold(self.failure_rate_threshold / 100.0)
            .slow_call_threshold(Duration::from_millis(self.slow_call_threshold_ms))
            .slow_call_rate_threshold(self.slow_call_rate_threshold / 100.0)
            .base_reset(Duration::from_millis(self.base_reset_ms))
            .half_open_max_calls(self.half_open_max_calls)
            .build()
    }
}

/// The full configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backends: BTreeMap<String, BackendConfig>,
    pub features: Features,
    pub thresholds: Thresholds,
    pub router: RouterOptions,
    pub circuit_breaker: CircuitBreakerOptions,
    /// Directory for the SQLite store. Defaults to `.claudette` under the
    /// user's home directory.
    pub storage_dir: Option<PathBuf>,
    /// Storage-less mode: ledger and cache writes become no-ops.
    pub in_memory: bool,
}

impl Config {
    /// Loads configuration from a JSON file, then applies the environment
    /// overlay. A missing path yields the default configuration with the
    /// standard backend set.
    pub fn load(path: Option<&Path>) -> Result<Self, ClaudetteError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ClaudetteError::InvalidInput(format!(
                        "cannot read config {}: {e}",
                        path.display()
                    ))
                })?;
                serde_json::from_str(&raw).map_err(|e| {
                    ClaudetteError::InvalidInput(format!(
                        "malformed config {}: {e}",
                        path.display()
                    ))
                })?
            }
            None => Self::default(),
        };
        if config.backends.is_empty() {
            config.backends = Self::standard_backends();
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// The built-in backend set used when no configuration file names any:
    /// the hosted providers wired to their conventional key variables, plus
    /// local Ollama.
    pub fn standard_backends() -> BTreeMap<String, BackendConfig> {
        let mut backends = BTreeMap::new();
        backends.insert(
            "openai".to_string(),
            BackendConfig {
                enabled: true,
                priority: 10,
                cost_per_1k_tokens: 0.0006,
                model: "gpt-4o-mini".to_string(),
                base_url: String::new(),
                api_key_ref: Some("OPENAI_API_KEY".to_string()),
                provider: Some("openai".to_string()),
            },
        );
        backends.insert(
            "claude".to_string(),
            BackendConfig {
                enabled: true,
                priority: 10,
                cost_per_1k_tokens: 0.003,
                model: "claude-sonnet-4-20250514".to_string(),
                base_url: String::new(),
                api_key_ref: Some("ANTHROPIC_API_KEY".to_string()),
                provider: Some("anthropic".to_string()),
            },
        );
        backends.insert(
            "qwen".to_string(),
            BackendConfig {
                enabled: true,
                priority: 20,
                cost_per_1k_tokens: 0.0004,
                model: "qwen-max".to_string(),
                base_url: String::new(),
                api_key_ref: Some("DASHSCOPE_API_KEY".to_string()),
                provider: Some("qwen".to_string()),
            },
        );
        backends.insert(
            "ollama".to_string(),
            BackendConfig {
                enabled: true,
                priority: 50,
                cost_per_1k_tokens: 0.0,
                model: "llama3".to_string(),
                base_url: String::new(),
                api_key_ref: None,
                provider: Some("ollama".to_string()),
            },
        );
        backends
    }

    /// Applies the environment overlay.
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(ENV_IN_MEMORY) {
            self.in_memory = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Ok(dir) = std::env::var(ENV_DB_DIR) {
            if !dir.is_empty() {
                self.storage_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(timeout) = std::env::var(ENV_TIMEOUT_MS) {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.thresholds.request_timeout_ms = ms;
            }
        }
    }

    fn validate(&self) -> Result<(), ClaudetteError> {
        for (name, backend) in &self.backends {
            if backend.model.trim().is_empty() {
                return Err(ClaudetteError::InvalidInput(format!(
                    "backend {name:?} has no model"
                )));
            }
            if backend.cost_per_1k_tokens < 0.0 {
                return Err(ClaudetteError::InvalidInput(format!(
                    "backend {name:?} has negative cost_per_1k_tokens"
                )));
            }
            backend.provider_kind(name)?;
        }
        let weight_sum =
            self.router.cost_weight + self.router.latency_weight + self.router.availability_weight;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ClaudetteError::InvalidInput(format!(
                "router weights sum to {weight_sum}, expected 1.0"
            )));
        }
        Ok(())
    }

    /// Scoring weights for the adaptive scorer.
    pub fn scoring_weights(&self) -> ScoringWeights {
        ScoringWeights::default()
    }

    /// The whole-request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.thresholds.request_timeout_ms)
    }

    /// Cache TTL for inserted responses.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.thresholds.cache_ttl_s)
    }

    /// Where the SQLite store lives.
    pub fn storage_dir(&self) -> PathBuf {
        if let Some(dir) = &self.storage_dir {
            return dir.clone();
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claudette")
    }

    /// Effective configuration as JSON with credential state summarized
    /// rather than exposed: each backend reports its key variable and
    /// whether it is set.
    pub fn masked_view(&self) -> serde_json::Value {
        let mut view = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(backends) = view
            .get_mut("backends")
            .and_then(serde_json::Value::as_object_mut)
        {
            for (name, entry) in backends.iter_mut() {
                let key_ref = self
                    .backends
                    .get(name)
                    .and_then(|b| b.api_key_ref.as_deref());
                let key_present =
                    key_ref.is_some_and(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()));
                if let Some(obj) = entry.as_object_mut() {
                    obj.insert("api_key_present".to_string(), json!(key_present));
                }
            }
        }
        view
    }
}

fn default_true() -> bool {
    true
}

fn default_priority() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.thresholds.cache_ttl_s, 3600);
        assert_eq!(config.thresholds.max_cache_size, 10_000);
        assert_eq!(config.thresholds.request_timeout_ms, 45_000);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.window_size, 20);
        assert!(config.router.fallback_enabled);
    }

    #[test]
    fn breaker_options_convert_percentages() {
        let breaker = CircuitBreakerOptions::default().to_breaker_config();
        let probe = breaker.reset_duration(5);
        assert_eq!(probe, Duration::from_millis(30_000));
    }

    #[test]
    fn bad_router_weights_fail_validation() {
        let mut config = Config::default();
        config.backends = Config::standard_backends();
        config.router.cost_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_a_minimal_config_document() {
        let raw = r#"{
            "backends": {
                "openai": { "model": "gpt-4o-mini", "cost_per_1k_tokens": 0.0006 }
            },
            "thresholds": { "cache_ttl_s": 60 }
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.thresholds.cache_ttl_s, 60);
        let backend = &config.backends["openai"];
        assert!(backend.enabled);
        assert_eq!(backend.priority, 100);
        assert_eq!(
            backend.provider_kind("openai").unwrap(),
            ProviderKind::OpenAi
        );
    }

    #[test]
    fn masked_view_never_contains_key_material() {
        let mut config = Config::default();
        config.backends = Config::standard_backends();
        let rendered = config.masked_view().to_string();
        assert!(rendered.contains("api_key_present"));
        assert!(!rendered.to_lowercase().contains("sk-"));
    }
}
