use bradax_guardrails::GuardrailError;
use bradax_store::StoreError;
use bradax_telemetry::TelemetryError;

/// Hard (non-fail-soft) orchestrator errors. These surface as 5xx; every
/// business-policy outcome is a fail-soft envelope instead.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Guardrail(#[from] GuardrailError),
}
