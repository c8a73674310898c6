use std::path::PathBuf;

use bradax_core::types::RuleId;
use bradax_telemetry::TelemetryError;

/// Errors raised while loading, compiling, or evaluating guardrail rules.
#[derive(Debug, thiserror::Error)]
pub enum GuardrailError {
    #[error("rule '{rule_id}': pattern '{name}' does not compile: {message}")]
    InvalidPattern {
        rule_id: RuleId,
        name: String,
        message: String,
    },

    #[error("duplicate rule id '{0}'")]
    DuplicateRule(RuleId),

    #[error("rule '{0}': action is sanitize but no keyword or pattern is configured")]
    UnmatchableSanitize(RuleId),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule file does not parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}
