use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::schemas::{TokenRequest, TokenResponse, ValidateResponse};
use super::{bearer_token, AppState};
use crate::error::{ApiError, ErrorBody};

/// `POST /api/v1/auth/token` -- issue a project-scoped token from an api-key.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    tag = "Auth",
    summary = "Issue token",
    description = "Verify a project api-key and issue a signed bearer token.",
    request_body(content = TokenRequest, description = "Project credentials"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Authentication failed", body = ErrorBody)
    )
)]
pub async fn issue_token(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let issued = state
        .auth
        .issue_token(&body.project_id, &body.api_key)
        .await?;

    Ok(Json(TokenResponse {
        access_token: issued.token,
        token_type: "bearer".to_owned(),
        expires_in: issued.expires_in_secs,
        project_id: issued.project_id,
    }))
}

/// `POST /api/v1/auth/validate` -- validate the presented bearer token.
#[utoipa::path(
    post,
    path = "/api/v1/auth/validate",
    tag = "Auth",
    summary = "Validate token",
    description = "Check the bearer token's signature, expiry, and key-id.",
    responses(
        (status = 200, description = "Token is valid", body = ValidateResponse),
        (status = 401, description = "Token rejected", body = ErrorBody)
    )
)]
pub async fn validate_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ValidateResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    let principal = state.auth.verify_token(token).await?;

    Ok(Json(ValidateResponse {
        valid: true,
        project_id: principal.project_id,
        organization: principal.organization,
        scopes: principal.scopes,
        expires_at: principal.expires_at,
    }))
}
