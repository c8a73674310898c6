use utoipa::OpenApi;

use bradax_core::guardrail::GuardrailSpec;
use bradax_core::invoke::{
    ChatMessage, InvokePayload, InvokeRequest, InvokeResponse, Operation, ReasonCode, Usage,
};
use bradax_telemetry::ProjectUsage;

use crate::error::ErrorBody;

use super::schemas::{
    HealthResponse, InfoResponse, IngestResponse, MetricsResponse, ModelInfo, ModelsResponse,
    ProjectDetail, ProjectSummary, ReloadResponse, RulesResponse, TokenRequest, TokenResponse,
    ValidateResponse,
};

/// OpenAPI document for the v1 surface, served at `/api-doc/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "bradax broker",
        description = "Governance gateway mediating application calls to LLM providers."
    ),
    paths(
        super::health::health,
        super::auth::issue_token,
        super::auth::validate_token,
        super::llm::invoke,
        super::llm::list_models,
        super::projects::list_projects,
        super::projects::get_project,
        super::projects::project_metrics,
        super::guardrails::list_rules,
        super::guardrails::reload_rules,
        super::system::ingest_telemetry,
        super::system::info,
    ),
    components(schemas(
        TokenRequest,
        TokenResponse,
        ValidateResponse,
        InvokeRequest,
        InvokeResponse,
        InvokePayload,
        ChatMessage,
        Operation,
        ReasonCode,
        Usage,
        GuardrailSpec,
        ModelInfo,
        ModelsResponse,
        ProjectSummary,
        ProjectDetail,
        ProjectUsage,
        RulesResponse,
        ReloadResponse,
        IngestResponse,
        InfoResponse,
        HealthResponse,
        MetricsResponse,
        ErrorBody,
    )),
    tags(
        (name = "Auth", description = "Token issuance and validation"),
        (name = "LLM", description = "Governed model invocation"),
        (name = "Projects", description = "Project read surface"),
        (name = "Guardrails", description = "Rule administration"),
        (name = "System", description = "Telemetry ingestion and info"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;
