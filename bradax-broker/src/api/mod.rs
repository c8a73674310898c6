pub mod auth;
pub mod guardrails;
pub mod health;
pub mod llm;
pub mod openapi;
pub mod projects;
pub mod schemas;
pub mod system;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use bradax_gateway::Orchestrator;
use bradax_guardrails::RuleStore;
use bradax_store::{ModelCatalog, ProjectStore};
use bradax_telemetry::TelemetryWriter;

use crate::auth::AuthService;
use crate::config::Environment;
use crate::error::ApiError;
use crate::middleware::{
    RateLimitLayer, RateLimiter, RequestLogLayer, SecurityHeadersLayer, TelemetryGuardLayer,
    TrustedHostLayer,
};

use self::openapi::ApiDoc;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub auth: Arc<AuthService>,
    pub projects: Arc<ProjectStore>,
    pub catalog: Arc<ModelCatalog>,
    pub rules: Arc<RuleStore>,
    pub writer: Arc<TelemetryWriter>,
    pub environment: Environment,
}

/// Extract the bearer token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("auth_invalid", "missing bearer token"))
}

/// Build the axum router with all v1 routes and the fixed middleware
/// chain: trusted host → CORS (non-production) → security headers → rate
/// limiter → request logger → telemetry validation → handler.
pub fn router(
    state: AppState,
    limiter: Arc<RateLimiter>,
    trusted_hosts: Option<Vec<String>>,
) -> Router {
    let environment = state.environment;
    let writer = Arc::clone(&state.writer);

    let routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/auth/token", post(auth::issue_token))
        .route("/api/v1/auth/validate", post(auth::validate_token))
        .route("/api/v1/llm/invoke", post(llm::invoke))
        .route("/api/v1/llm/models", get(llm::list_models))
        .route("/api/v1/projects", get(projects::list_projects))
        .route("/api/v1/projects/{project_id}", get(projects::get_project))
        .route(
            "/api/v1/projects/{project_id}/metrics",
            get(projects::project_metrics),
        )
        .route("/api/v1/guardrails", get(guardrails::list_rules))
        .route("/api/v1/guardrails/reload", post(guardrails::reload_rules))
        .route("/api/v1/system/telemetry", post(system::ingest_telemetry))
        .route("/api/v1/system/info", get(system::info))
        .with_state(state);

    // Layers run outermost-last-added; the chain below reads bottom-up.
    let mut app = routes
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TelemetryGuardLayer::new(Arc::clone(&writer)))
        .layer(RequestLogLayer)
        .layer(RateLimitLayer::new(limiter, writer))
        .layer(SecurityHeadersLayer);

    if !environment.is_production() {
        app = app.layer(CorsLayer::permissive());
    }

    app.layer(TrustedHostLayer::new(trusted_hosts))
        .layer(TraceLayer::new_for_http())
}
