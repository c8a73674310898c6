use serde::{Deserialize, Serialize};

use bradax_core::types::ProjectId;

/// Aggregated usage for one project, computed by scanning the main stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProjectUsage {
    pub project_id: ProjectId,
    /// Number of `request_start` events.
    pub total_requests: u64,
    /// Number of `error` events.
    pub total_errors: u64,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    /// Mean duration across completed requests, in milliseconds.
    pub avg_duration_ms: f64,
    /// Errors as a fraction of requests, `0.0` when no requests exist.
    pub error_rate: f64,
    /// Completions that reported at least one triggered guardrail.
    pub guardrails_triggered: u64,
    /// Distinct models that produced successful completions, sorted.
    pub models_used: Vec<String>,
}

impl ProjectUsage {
    /// An all-zero aggregate for a project with no recorded traffic.
    #[must_use]
    pub fn empty(project_id: ProjectId) -> Self {
        Self {
            project_id,
            total_requests: 0,
            total_errors: 0,
            total_tokens: 0,
            total_cost_usd: 0.0,
            avg_duration_ms: 0.0,
            error_rate: 0.0,
            guardrails_triggered: 0,
            models_used: Vec::new(),
        }
    }
}
