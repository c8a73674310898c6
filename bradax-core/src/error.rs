use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error taxonomy used uniformly across the broker.
///
/// `Validation`, `Authentication`, `Authorization`, and `RateLimited`
/// surface as native 4xx statuses; `GuardrailBlocked` and `ProviderError`
/// are fail-soft (HTTP 200, `success=false`); `Internal` surfaces as 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    RateLimited,
    GuardrailBlocked,
    ProviderError,
    Internal,
}

/// Top-level error type for the broker core.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("guardrail blocked: {0}")]
    GuardrailBlocked(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// The taxonomy category for this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::Authorization(_) => ErrorCategory::Authorization,
            Self::RateLimited(_) => ErrorCategory::RateLimited,
            Self::GuardrailBlocked(_) => ErrorCategory::GuardrailBlocked,
            Self::Provider(_) => ErrorCategory::ProviderError,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping() {
        assert_eq!(
            BrokerError::Authentication("bad token".into()).category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            BrokerError::Provider("upstream 503".into()).category(),
            ErrorCategory::ProviderError
        );
    }

    #[test]
    fn category_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorCategory::RateLimited).unwrap(),
            "\"rate_limited\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCategory::GuardrailBlocked).unwrap(),
            "\"guardrail_blocked\""
        );
    }
}
