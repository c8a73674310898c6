use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use bradax_telemetry::TelemetryEvent;

use super::schemas::{InfoResponse, IngestResponse};
use super::{bearer_token, AppState};
use crate::error::{ApiError, ErrorBody};

/// `POST /api/v1/system/telemetry` -- ingest an SDK-side event batch into
/// the main stream.
#[utoipa::path(
    post,
    path = "/api/v1/system/telemetry",
    tag = "System",
    summary = "Ingest SDK telemetry",
    request_body(content = serde_json::Value, description = "Array of telemetry events"),
    responses(
        (status = 200, description = "Events appended", body = IngestResponse),
        (status = 400, description = "Batch does not parse", body = ErrorBody),
        (status = 401, description = "Authentication failed", body = ErrorBody)
    )
)]
pub async fn ingest_telemetry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    state.auth.verify_token(token).await?;

    let events: Vec<TelemetryEvent> = serde_json::from_value(batch).map_err(|_| ApiError {
        status: axum::http::StatusCode::BAD_REQUEST,
        body: ErrorBody {
            error: "batch is not an array of telemetry events".to_owned(),
            category: bradax_core::error::ErrorCategory::Validation,
            code: "telemetry_batch_invalid".to_owned(),
        },
    })?;

    let mut accepted = 0;
    for event in &events {
        state
            .writer
            .record_event(event)
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        accepted += 1;
    }
    Ok(Json(IngestResponse { accepted }))
}

/// `GET /api/v1/system/info` -- environment, version, and component facts.
#[utoipa::path(
    get,
    path = "/api/v1/system/info",
    tag = "System",
    summary = "System info",
    responses(
        (status = 200, description = "Service information", body = InfoResponse)
    )
)]
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "bradax-broker".to_owned(),
        version: env!("CARGO_PKG_VERSION").to_owned(),
        environment: state.environment.as_str().to_owned(),
        active_rules: state.rules.snapshot().enabled_count(),
        provider: state.orchestrator.provider_name().to_owned(),
    })
}
