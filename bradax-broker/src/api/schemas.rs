use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use bradax_core::project::ProjectStatus;
use bradax_core::types::{ModelId, ProjectId};

/// Request body for `POST /api/v1/auth/token`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[schema(example = "proj_real_001")]
    pub project_id: ProjectId,
    /// Structured project api-key.
    pub api_key: String,
}

/// Response for a successful token issuance.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    /// Token lifetime in seconds.
    #[schema(example = 900)]
    pub expires_in: u64,
    pub project_id: ProjectId,
}

/// Response for `POST /api/v1/auth/validate`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    pub project_id: ProjectId,
    pub organization: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// One allowed model with its catalog limits.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModelInfo {
    pub model_id: ModelId,
    #[schema(example = "GPT-4.1 Nano")]
    pub name: String,
    #[schema(example = 128000)]
    pub max_tokens: u32,
    pub cost_per_1k_usd: f64,
}

/// Response for `GET /api/v1/llm/models`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub project_id: ProjectId,
    pub total_allowed: usize,
}

/// One row of `GET /api/v1/projects`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProjectSummary {
    pub project_id: ProjectId,
    pub name: String,
    pub status: ProjectStatus,
    pub budget_remaining: f64,
}

/// Full project view. The api-key fingerprint is never exposed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProjectDetail {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub organization: Option<String>,
    pub allowed_models: Vec<ModelId>,
    pub status: ProjectStatus,
    pub budget_remaining: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response for `GET /api/v1/guardrails`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RulesResponse {
    pub rules: Vec<bradax_core::guardrail::GuardrailSpec>,
    pub total: usize,
}

/// Response after reloading the rule file.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReloadResponse {
    /// Number of rules now active.
    #[schema(example = 7)]
    pub reloaded: usize,
}

/// Response for `POST /api/v1/system/telemetry`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    pub accepted: usize,
}

/// Response for `GET /api/v1/system/info`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    #[schema(example = "bradax-broker")]
    pub service: String,
    pub version: String,
    #[schema(example = "development")]
    pub environment: String,
    pub active_rules: usize,
    #[schema(example = "openai")]
    pub provider: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub metrics: MetricsResponse,
}

/// Invocation pipeline counters.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    pub invoked: u64,
    pub completed: u64,
    pub guardrail_blocked: u64,
    pub sanitized: u64,
    pub policy_blocked: u64,
    pub provider_errors: u64,
    pub validation_errors: u64,
}
