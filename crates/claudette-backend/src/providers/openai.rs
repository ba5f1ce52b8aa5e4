//! OpenAI-style chat-completions backend.
//!
//! Also serves Qwen-compatible endpoints, which speak the same dialect from
//! a different base URL.

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

pub struct OpenAiBackend {
    name: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    cost_per_1k: f64,
    profile: CapabilityProfile,
    latency: RollingLatency,
    client: Client,
}

impl OpenAiBackend {
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
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[async_trait]
impl Backend for OpenAiBackend {
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
            .get(format!("{}/models", self.base_url))
            .bearer_auth(key)
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
        let body = ChatCompletionBody {
            model,
            messages: vec![Message {
                role: "user",
                content: request.context_prompt(),
            }],
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
        };

        let started = Instant::now();
        let call = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
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

        let reply: ChatCompletionReply = response
            .json()
            .await
            .map_err(|e| SendError::new(FailureKind::Transient, format!("malformed reply: {e}")))?;
        self.latency.observe(started.elapsed());

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SendError::new(FailureKind::Transient, "reply carried no choices"))?;

        let usage = reply.usage.unwrap_or(Usage {
            prompt_tokens: None,
            completion_tokens: None,
        });
        Ok(BackendResponse {
            content,
            tokens_input: usage.prompt_tokens,
            tokens_output: usage.completion_tokens,
        })
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
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

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(api_key: Option<&str>) -> OpenAiBackend {
        OpenAiBackend::new(
            BackendSettings {
                name: "openai".into(),
                provider: crate::ProviderKind::OpenAi,
                model: "gpt-4o-mini".into(),
                base_url: String::new(),
                api_key: api_key.map(String::from),
                cost_per_1k_tokens: 0.0006,
            },
            CapabilityProfile::openai(),
            Client::new(),
        )
    }

    #[test]
    fn cost_estimate_is_linear() {
        let b = backend(Some("sk-test"));
        assert_eq!(b.estimate_cost(1000), 0.0006);
        assert_eq!(b.estimate_cost(500), 0.0003);
        assert_eq!(b.estimate_cost(0), 0.0);
    }

    #[tokio::test]
    async fn send_without_key_is_auth_error() {
        let b = backend(None);
        let err = b
            .send(&ChatRequest::new("hi"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Auth);
    }

    #[test]
    fn debug_masks_the_key() {
        let b = backend(Some("sk-verysecretkey99"));
        let rendered = format!("{b:?}");
        assert!(!rendered.contains("verysecret"));
    }
}
