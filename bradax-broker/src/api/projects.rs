use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use bradax_core::types::ProjectId;
use bradax_telemetry::ProjectUsage;

use super::schemas::{ProjectDetail, ProjectSummary};
use super::{bearer_token, AppState};
use crate::error::{ApiError, ErrorBody};

/// `GET /api/v1/projects` -- project summaries (operator surface).
#[utoipa::path(
    get,
    path = "/api/v1/projects",
    tag = "Projects",
    summary = "List projects",
    responses(
        (status = 200, description = "Project summaries", body = [ProjectSummary]),
        (status = 401, description = "Authentication failed", body = ErrorBody)
    )
)]
pub async fn list_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProjectSummary>>, ApiError> {
    let token = bearer_token(&headers)?;
    state.auth.verify_token(token).await?;

    let summaries = state
        .projects
        .list()
        .map_err(|e| ApiError::internal(e.to_string()))?
        .into_iter()
        .map(|record| ProjectSummary {
            project_id: record.project_id,
            name: record.name,
            status: record.status,
            budget_remaining: record.budget_remaining,
        })
        .collect();
    Ok(Json(summaries))
}

/// `GET /api/v1/projects/{project_id}` -- one project, fingerprint omitted.
#[utoipa::path(
    get,
    path = "/api/v1/projects/{project_id}",
    tag = "Projects",
    summary = "Get project",
    params(("project_id" = String, Path, description = "Project identifier")),
    responses(
        (status = 200, description = "Project detail", body = ProjectDetail),
        (status = 403, description = "Token is scoped to a different project", body = ErrorBody),
        (status = 404, description = "Unknown project", body = ErrorBody)
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectDetail>, ApiError> {
    let project_id = ProjectId::new(project_id);
    let principal = authorize_for(&state, &headers, &project_id).await?;

    let record = state
        .projects
        .get(&principal.project_id)
        .map_err(|_| ApiError::not_found("project_unknown", "project not found"))?;

    Ok(Json(ProjectDetail {
        project_id: record.project_id,
        name: record.name,
        description: record.description,
        organization: record.organization,
        allowed_models: record.allowed_models,
        status: record.status,
        budget_remaining: record.budget_remaining,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }))
}

/// `GET /api/v1/projects/{project_id}/metrics` -- aggregated usage from the
/// main telemetry stream.
#[utoipa::path(
    get,
    path = "/api/v1/projects/{project_id}/metrics",
    tag = "Projects",
    summary = "Project metrics",
    params(("project_id" = String, Path, description = "Project identifier")),
    responses(
        (status = 200, description = "Aggregated usage", body = ProjectUsage),
        (status = 403, description = "Token is scoped to a different project", body = ErrorBody)
    )
)]
pub async fn project_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectUsage>, ApiError> {
    let project_id = ProjectId::new(project_id);
    authorize_for(&state, &headers, &project_id).await?;

    let usage = state
        .writer
        .aggregate(&project_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(usage))
}

/// Verify the bearer token and require it to be scoped to `project_id`.
async fn authorize_for(
    state: &AppState,
    headers: &HeaderMap,
    project_id: &ProjectId,
) -> Result<bradax_core::principal::Principal, ApiError> {
    let token = bearer_token(headers)?;
    let principal = state.auth.verify_token(token).await?;
    if &principal.project_id != project_id {
        return Err(ApiError::forbidden(
            "project_mismatch",
            "token is scoped to a different project",
        ));
    }
    Ok(principal)
}
