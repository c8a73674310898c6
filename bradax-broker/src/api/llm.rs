use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::error;

use bradax_core::error::ErrorCategory;
use bradax_core::invoke::{InvokeRequest, InvokeResponse};
use bradax_telemetry::{TelemetryEvent, TelemetryKind};

use super::schemas::{ModelInfo, ModelsResponse};
use super::{bearer_token, AppState};
use crate::error::{ApiError, ErrorBody};

/// `POST /api/v1/llm/invoke` -- invoke a model through the governed pipeline.
///
/// Business failures (policy, guardrail, provider) come back as HTTP 200
/// with `success=false` and a stable `reason_code`; only shape errors and
/// broker-internal faults use native statuses.
#[utoipa::path(
    post,
    path = "/api/v1/llm/invoke",
    tag = "LLM",
    summary = "Invoke model",
    description = "Run one model invocation through auth, guardrails, and the provider.",
    request_body(content = InvokeRequest, description = "Invocation request"),
    responses(
        (status = 200, description = "Completed (including fail-soft outcomes)", body = InvokeResponse),
        (status = 401, description = "Authentication failed", body = ErrorBody),
        (status = 403, description = "Missing scope", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody)
    )
)]
pub async fn invoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let principal = state.auth.verify_token(token).await?;

    if principal.project_id != request.project_id {
        return Err(ApiError::unauthorized(
            "auth_project_mismatch",
            "token does not belong to the requested project",
        ));
    }
    if !principal.has_scope("llm:invoke") {
        return Err(ApiError::forbidden("scope_missing", "token lacks the llm:invoke scope"));
    }

    match state.orchestrator.invoke(&principal, request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!(error = %e, "invocation pipeline failed");
            let event = TelemetryEvent::new(TelemetryKind::Error {
                request_id: None,
                project_id: Some(principal.project_id.clone()),
                category: ErrorCategory::Internal,
                code: "internal_error".to_owned(),
                message: e.to_string(),
            });
            if let Err(e) = state.writer.record_event(&event).await {
                error!(error = %e, "failed to record internal error event");
            }
            Err(ApiError::internal("internal error"))
        }
    }
}

/// `GET /api/v1/llm/models` -- the caller's allowed models with limits.
#[utoipa::path(
    get,
    path = "/api/v1/llm/models",
    tag = "LLM",
    summary = "List allowed models",
    description = "Intersect the model catalog with the caller project's allow-list.",
    responses(
        (status = 200, description = "Allowed models", body = ModelsResponse),
        (status = 401, description = "Authentication failed", body = ErrorBody)
    )
)]
pub async fn list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ModelsResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let principal = state.auth.verify_token(token).await?;
    if !principal.has_scope("llm:models") {
        return Err(ApiError::forbidden("scope_missing", "token lacks the llm:models scope"));
    }

    let project = state
        .projects
        .get(&principal.project_id)
        .map_err(|_| ApiError::unauthorized("auth_unknown_project", "project not found"))?;

    let models: Vec<ModelInfo> = state
        .catalog
        .entries()
        .into_iter()
        .filter(|entry| project.allows_model(&entry.model_id))
        .map(|entry| ModelInfo {
            model_id: entry.model_id.clone(),
            name: entry.name.clone(),
            max_tokens: entry.max_tokens,
            cost_per_1k_usd: entry.cost_per_1k_usd,
        })
        .collect();

    let total_allowed = models.len();
    Ok(Json(ModelsResponse {
        models,
        project_id: principal.project_id,
        total_allowed,
    }))
}
