use axum::extract::State;
use axum::Json;

use super::schemas::{HealthResponse, MetricsResponse};
use super::AppState;

/// `GET /health` -- liveness plus a metrics snapshot.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snap = state.orchestrator.metrics().snapshot();
    Json(HealthResponse {
        status: "ok".to_owned(),
        metrics: MetricsResponse {
            invoked: snap.invoked,
            completed: snap.completed,
            guardrail_blocked: snap.guardrail_blocked,
            sanitized: snap.sanitized,
            policy_blocked: snap.policy_blocked,
            provider_errors: snap.provider_errors,
            validation_errors: snap.validation_errors,
        },
    })
}
