use serde::{Deserialize, Serialize};

use crate::guardrail::GuardrailSpec;
use crate::types::{ModelId, ProjectId, RequestId, RuleId};

/// Invocation operation requested by the SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Chat,
    Stream,
    Batch,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChatMessage {
    /// Message role (`user`, `assistant`, `system`).
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_owned(),
            content: content.into(),
        }
    }
}

/// Invocation payload. `messages` is the primary shape; `prompt` is accepted
/// for compatibility and converted to a single user message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvokePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl InvokePayload {
    /// Normalize to a message list: `messages` wins, a bare `prompt` becomes
    /// one user message, and an empty payload yields `None`.
    #[must_use]
    pub fn to_messages(&self) -> Option<Vec<ChatMessage>> {
        if let Some(messages) = &self.messages {
            if messages.is_empty() {
                return None;
            }
            return Some(messages.clone());
        }
        match &self.prompt {
            Some(prompt) if !prompt.trim().is_empty() => Some(vec![ChatMessage::user(prompt)]),
            _ => None,
        }
    }
}

/// A model invocation request as received on `/api/v1/llm/invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvokeRequest {
    pub operation: Operation,

    pub model: ModelId,

    pub payload: InvokePayload,

    pub project_id: ProjectId,

    /// Caller-supplied transient rules, composed with the base rule set for
    /// this request only. Validated (regex compile) before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_guardrails: Option<Vec<GuardrailSpec>>,

    /// Optional client-assigned request id; generated when absent. Not a
    /// deduplication key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
}

/// Stable machine-readable reason for a fail-soft or failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    GuardrailBlocked,
    PolicyBlocked,
    ValidationError,
    ProviderError,
    ProviderTimeout,
}

impl ReasonCode {
    /// The `model_used` sentinel reported for this terminal step.
    #[must_use]
    pub fn model_sentinel(self) -> &'static str {
        match self {
            Self::GuardrailBlocked => "guardrail_blocked",
            Self::PolicyBlocked => "policy_blocked",
            Self::ValidationError => "validation_error",
            Self::ProviderError | Self::ProviderTimeout => "provider_error",
        }
    }
}

/// Token accounting for a completed provider call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

/// The invocation response envelope.
///
/// Handled failures (policy, guardrail, provider) are fail-soft: HTTP 200
/// with `success=false` and a stable [`ReasonCode`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InvokeResponse {
    pub success: bool,

    pub request_id: RequestId,

    /// Model that produced the response, or a terminal-step sentinel on
    /// failure (`guardrail_blocked`, `provider_error`, `policy_blocked`,
    /// `validation_error`).
    pub model_used: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<ReasonCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails_triggered: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_rules: Option<Vec<RuleId>>,
}

impl InvokeResponse {
    /// Build a successful envelope.
    #[must_use]
    pub fn ok(request_id: RequestId, model_used: impl Into<String>, content: String) -> Self {
        Self {
            success: true,
            request_id,
            model_used: model_used.into(),
            reason_code: None,
            content: Some(content),
            usage: None,
            guardrails_triggered: Some(false),
            triggered_rules: None,
        }
    }

    /// Build a fail-soft envelope for the given reason.
    #[must_use]
    pub fn fail_soft(request_id: RequestId, reason: ReasonCode) -> Self {
        Self {
            success: false,
            request_id,
            model_used: reason.model_sentinel().to_owned(),
            reason_code: Some(reason),
            content: None,
            usage: None,
            guardrails_triggered: None,
            triggered_rules: None,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    #[must_use]
    pub fn with_triggered_rules(mut self, rules: Vec<RuleId>) -> Self {
        self.guardrails_triggered = Some(!rules.is_empty());
        self.triggered_rules = if rules.is_empty() { None } else { Some(rules) };
        self
    }
}
