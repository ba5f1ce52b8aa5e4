//! Local Ollama backend. No credentials; availability means the daemon is up.

use crate::http::{classify_status, classify_transport};
use crate::profile::CapabilityProfile;
use crate::providers::BackendSettings;
use crate::{Backend, BackendResponse, RollingLatency};
use async_trait::async_trait;
use claudette_core::{ChatRequest, FailureKind, SendError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub struct OllamaBackend {
    name: String,
    model: String,
    base_url: String,
    cost_per_1k: f64,
    profile: CapabilityProfile,
    latency: RollingLatency,
    client: Client,
}

impl OllamaBackend {
    pub fn new(settings: BackendSettings, profile: CapabilityProfile, client: Client) -> Self {
        Self {
            base_url: settings.effective_base_url(),
            name: settings.name,
            model: settings.model,
            cost_per_1k: settings.cost_per_1k_tokens,
            latency: RollingLatency::new(profile.avg_latency_ms),
            profile,
            client,
        }
    }
}

#[derive(Serialize)]
struct OllamaChatBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaChatReply {
    message: ReplyMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl Backend for OllamaBackend {
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
        let probe = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(deadline)
            .send();
        match tokio::time::timeout(deadline, probe).await {
            Ok(Ok(resp)) => resp.status().is_success(),
            _ => false,
        }
    }

    fn estimate_cost(&self, tokens: u32) -> f64 {
        // Local inference is typically configured at zero cost.
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
        let model = request.options.model.as_deref().unwrap_or(&self.model);
        let options = if request.options.temperature.is_some() || request.options.max_tokens.is_some()
        {
            Some(GenerationOptions {
                temperature: request.options.temperature,
                num_predict: request.options.max_tokens,
            })
        } else {
            None
        };
        let body = OllamaChatBody {
            model,
            messages: vec![Message {
                role: "user",
                content: request.context_prompt(),
            }],
            stream: false,
            options,
        };

        let started = Instant::now();
        let call = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, None));
        }

        let reply: OllamaChatReply = response
            .json()
            .await
            .map_err(|e| SendError::new(FailureKind::Transient, format!("malformed reply: {e}")))?;
        self.latency.observe(started.elapsed());

        Ok(BackendResponse {
            content: reply.message.content,
            tokens_input: reply.prompt_eval_count,
            tokens_output: reply.eval_count,
        })
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}
