use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use bradax_core::invoke::{ChatMessage, Usage};
use bradax_core::types::ModelId;

use crate::adapter::{Completion, InvokeParams, ProviderAdapter};
use crate::error::ProviderError;

/// Chat-completions adapter over an OpenAI-compatible HTTP endpoint.
pub struct ChatHttpProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl ChatHttpProvider {
    /// Create an adapter posting to `{base_url}/chat/completions`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    /// Use a custom `reqwest::Client` (e.g. with connection timeouts).
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Parse an upstream body into a [`Completion`]. Split out so response
/// handling is testable without a live endpoint.
fn parse_completion(raw: serde_json::Value) -> Result<Completion, ProviderError> {
    let parsed: ChatResponse = serde_json::from_value(raw.clone())
        .map_err(|e| ProviderError::Serialization(e.to_string()))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ProviderError::Serialization("response carries no choices".to_owned()))?;

    let usage = parsed.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
        cost_usd: None,
    });

    Ok(Completion { text, usage, raw })
}

#[async_trait]
impl ProviderAdapter for ChatHttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        model: &ModelId,
        messages: &[ChatMessage],
        params: &InvokeParams,
    ) -> Result<Completion, ProviderError> {
        let mut body = serde_json::json!({
            "model": model.as_str(),
            "messages": messages,
        });
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = max_tokens.into();
        }
        if let Some(temperature) = params.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        debug!(model = %model, messages = messages.len(), "calling upstream provider");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(std::time::Duration::from_secs(0))
                } else if e.is_connect() {
                    ProviderError::Connection(e.to_string())
                } else {
                    ProviderError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Serialization(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::RemoteStatus {
                status: status.as_u16(),
                body: raw.to_string(),
            });
        }

        parse_completion(raw)
    }
}
