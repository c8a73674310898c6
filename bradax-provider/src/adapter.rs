use async_trait::async_trait;

use bradax_core::invoke::{ChatMessage, Usage};
use bradax_core::types::ModelId;

use crate::error::ProviderError;

/// Generation parameters forwarded to the upstream service.
#[derive(Debug, Clone, Default)]
pub struct InvokeParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// A completed upstream call.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text of the first choice.
    pub text: String,
    /// Token accounting, when the upstream reported it.
    pub usage: Option<Usage>,
    /// Raw response body, kept for forensic capture on failure paths.
    pub raw: serde_json::Value,
}

/// The only component that speaks to the upstream LLM service.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// request tasks behind an `Arc`. They are synchronous from the
/// orchestrator's standpoint and must return structured errors for
/// network, timeout, and remote-status conditions.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable adapter name, used in system info and logs.
    fn name(&self) -> &str;

    /// Invoke the given model with a message list.
    async fn invoke(
        &self,
        model: &ModelId,
        messages: &[ChatMessage],
        params: &InvokeParams,
    ) -> Result<Completion, ProviderError>;
}
