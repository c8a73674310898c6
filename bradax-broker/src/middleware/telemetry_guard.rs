use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::warn;

use bradax_core::error::ErrorCategory;
use bradax_telemetry::{TelemetryEvent, TelemetryKind, TelemetryWriter};

/// Endpoints that must carry the full telemetry header set.
const PROTECTED_PREFIXES: &[&str] = &[
    "/api/v1/llm/invoke",
    "/api/v1/llm/batch",
    "/api/v1/llm/stream",
];

/// Headers the SDK must forward on every protected request.
pub const REQUIRED_TELEMETRY_HEADERS: &[&str] = &[
    "x-bradax-sdk-version",
    "x-bradax-platform",
    "x-bradax-machine-fingerprint",
    "x-bradax-session-id",
    "x-bradax-telemetry-enabled",
    "x-bradax-environment",
    "x-bradax-runtime-version",
];

/// User-agent prefix of the official SDK.
pub const SDK_USER_AGENT_PREFIX: &str = "bradax-sdk/";

/// Tower layer rejecting protected requests that are missing mandatory
/// telemetry headers, before authentication runs. The request body is
/// never read. Each rejection appends a bypass-attempt event.
#[derive(Clone)]
pub struct TelemetryGuardLayer {
    writer: Arc<TelemetryWriter>,
}

impl TelemetryGuardLayer {
    pub fn new(writer: Arc<TelemetryWriter>) -> Self {
        Self { writer }
    }
}

impl<S> Layer<S> for TelemetryGuardLayer {
    type Service = TelemetryGuardMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TelemetryGuardMiddleware {
            inner,
            writer: Arc::clone(&self.writer),
        }
    }
}

#[derive(Clone)]
pub struct TelemetryGuardMiddleware<S> {
    inner: S,
    writer: Arc<TelemetryWriter>,
}

impl<S> Service<Request<Body>> for TelemetryGuardMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let writer = Arc::clone(&self.writer);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let path = req.uri().path();
            if !PROTECTED_PREFIXES.iter().any(|p| path.starts_with(p)) {
                return inner.call(req).await;
            }

            let violations = collect_violations(&req);
            if violations.is_empty() {
                return inner.call(req).await;
            }

            warn!(path, violations = violations.len(), "telemetry bypass attempt blocked");
            let event = TelemetryEvent::new(TelemetryKind::Error {
                request_id: None,
                project_id: None,
                category: ErrorCategory::Validation,
                code: "telemetry_bypass_attempt".to_owned(),
                message: violations.join("; "),
            });
            if let Err(e) = writer.record_event(&event).await {
                warn!(error = %e, "failed to record bypass-attempt event");
            }

            let body = serde_json::json!({
                "error": "mandatory telemetry headers missing or invalid",
                "category": ErrorCategory::Validation,
                "code": "telemetry_bypass_attempt",
                "violations": violations,
            });
            Ok((StatusCode::FORBIDDEN, axum::Json(body)).into_response())
        })
    }
}

fn collect_violations(req: &Request<Body>) -> Vec<String> {
    let mut violations = Vec::new();

    for name in REQUIRED_TELEMETRY_HEADERS {
        match req.headers().get(*name).and_then(|v| v.to_str().ok()) {
            None => violations.push(format!("missing header: {name}")),
            Some(value) if value.trim().is_empty() => {
                violations.push(format!("empty header: {name}"));
            }
            Some(value) if *name == "x-bradax-telemetry-enabled" => {
                if !value.eq_ignore_ascii_case("true") {
                    violations.push(format!("telemetry disabled: {name}={value}"));
                }
            }
            Some(_) => {}
        }
    }

    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !user_agent.starts_with(SDK_USER_AGENT_PREFIX) {
        violations.push(format!(
            "user-agent must begin with {SDK_USER_AGENT_PREFIX}"
        ));
    }

    violations
}
