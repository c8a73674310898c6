use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ProjectId;

/// A verified caller identity produced by token validation.
///
/// Scope-checked by route handlers; the orchestrator trusts it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Principal {
    pub project_id: ProjectId,

    #[serde(default)]
    pub organization: Option<String>,

    /// Capability tags granted to the token (e.g. `llm:invoke`).
    pub scopes: Vec<String>,

    pub expires_at: DateTime<Utc>,
}

impl Principal {
    /// Whether the principal holds a scope, honoring `prefix:*` wildcards.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| {
            s == scope
                || s.strip_suffix('*')
                    .is_some_and(|prefix| scope.starts_with(prefix))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(scopes: &[&str]) -> Principal {
        Principal {
            project_id: ProjectId::new("proj_real_001"),
            organization: Some("acme".to_owned()),
            scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
            expires_at: Utc::now(),
        }
    }

    #[test]
    fn exact_scope_matches() {
        assert!(principal(&["llm:invoke"]).has_scope("llm:invoke"));
        assert!(!principal(&["llm:invoke"]).has_scope("llm:models"));
    }

    #[test]
    fn wildcard_scope_matches_prefix() {
        let p = principal(&["llm:*"]);
        assert!(p.has_scope("llm:invoke"));
        assert!(p.has_scope("llm:models"));
        assert!(!p.has_scope("project:read"));
    }
}
