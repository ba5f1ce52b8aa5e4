//! Anthropic messages-API backend.

use crate::http::{classify_status, classify_transport, parse_retry_after};
use crate::profile::CapabilityProfile;
use crate::providers::BackendSettings;
use crate::{Backend, BackendResponse, RollingLatency};
use async_trait::async_trait;
use claudette_core::{ChatRequest, FailureKind, SendError};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const API_VERSION: &str = "2023-06-01";

/// Fallback generation budget; the messages API requires max_tokens.
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicBackend {
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    cost_per_1k: f64,
    profile: CapabilityProfile,
    latency: RollingLatency,
    client: Client,
}

impl AnthropicBackend {
    pub fn new(settings: BackendSettings, profile: CapabilityProfile, client: Client) -> Self {
        Self {
            base_url: settings.effective_base_url(),
            name: settings.name,
            model: settings.model,
            api_key: settings.api_key,
            cost_per_1k: settings.cost_per_1k_tokens,
            latency: RollingLatency::new(profile.avg_latency_ms),
            profile,
            client,
        }
    }

    fn api_key(&self) -> Result<&str, SendError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SendError::new(FailureKind::Auth, "no API key configured"))
    }
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn profile(&self) -> &CapabilityProfile {
        &self.profile
    }

    async fn is_available(&self, deadline: Duration) -> bool {
        let Ok(key) = self.api_key() else {
            return false;
        };
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .timeout(deadline)
            .send();
        match tokio::time::timeout(deadline, probe).await {
            Ok(Ok(resp)) => resp.status().is_success(),
            _ => false,
        }
    }

    fn estimate_cost(&self, tokens: u32) -> f64 {
        f64::from(tokens) / 1000.0 * self.cost_per_1k
    }

    fn latency_score(&self) -> f64 {
        self.latency.seconds()
    }

    async fn send(
        &self,
        request: &ChatRequest,
        deadline: Duration,
    ) -> Result<BackendResponse, SendError> {
        let key = self.api_key()?;
        let model = request.options.model.as_deref().unwrap_or(&self.model);
        let body = MessagesBody {
            model,
            max_tokens: request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![Message {
                role: "user",
                content: request.context_prompt(),
            }],
            temperature: request.options.temperature,
        };

        let started = Instant::now();
        let call = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .timeout(deadline)
            .send();
        let response = match tokio::time::timeout(deadline, call).await {
            Err(_) => {
                return Err(SendError::new(
                    FailureKind::Timeout,
                    format!("no answer within {deadline:?}"),
                ))
            }
            Ok(Err(e)) => return Err(classify_transport(&e)),
            Ok(Ok(resp)) => resp,
        };

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, retry_after));
        }

        let reply: MessagesReply = response
            .json()
            .await
            .map_err(|e| SendError::new(FailureKind::Transient, format!("malformed reply: {e}")))?;
        self.latency.observe(started.elapsed());

        let content: String = reply
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();
        if content.is_empty() {
            return Err(SendError::new(
                FailureKind::Transient,
                "reply carried no text blocks",
            ));
        }

        let usage = reply.usage.unwrap_or(Usage {
            input_tokens: None,
            output_tokens: None,
        });
        Ok(BackendResponse {
            content,
            tokens_input: usage.input_tokens,
            tokens_output: usage.output_tokens,
        })
    }
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self.api_key.as_deref().map(claudette_core::mask_secret),
            )
            .finish()
    }
}
