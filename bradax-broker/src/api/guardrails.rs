use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::error;

use super::schemas::{ReloadResponse, RulesResponse};
use super::{bearer_token, AppState};
use crate::error::{ApiError, ErrorBody};

/// `GET /api/v1/guardrails` -- the active rule set.
#[utoipa::path(
    get,
    path = "/api/v1/guardrails",
    tag = "Guardrails",
    summary = "List active rules",
    responses(
        (status = 200, description = "Active rules", body = RulesResponse),
        (status = 401, description = "Authentication failed", body = ErrorBody)
    )
)]
pub async fn list_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RulesResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    state.auth.verify_token(token).await?;

    let snapshot = state.rules.snapshot();
    let rules: Vec<_> = snapshot.enabled_specs().into_iter().cloned().collect();
    let total = rules.len();
    Ok(Json(RulesResponse { rules, total }))
}

/// `POST /api/v1/guardrails/reload` -- atomically re-load the rule file.
///
/// The swap is all-or-nothing: a broken file leaves the running set
/// untouched and reports an error.
#[utoipa::path(
    post,
    path = "/api/v1/guardrails/reload",
    tag = "Guardrails",
    summary = "Reload rules",
    responses(
        (status = 200, description = "Rules reloaded", body = ReloadResponse),
        (status = 401, description = "Authentication failed", body = ErrorBody),
        (status = 500, description = "Rule file rejected", body = ErrorBody)
    )
)]
pub async fn reload_rules(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReloadResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    state.auth.verify_token(token).await?;

    match state.rules.reload() {
        Ok(reloaded) => Ok(Json(ReloadResponse { reloaded })),
        Err(e) => {
            error!(error = %e, "guardrail reload rejected");
            Err(ApiError::internal("rule file rejected; previous rules remain active"))
        }
    }
}
