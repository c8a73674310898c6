use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ModelId, ProjectId};

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Inactive,
    Suspended,
}

/// A project record as persisted in `data/projects.json`.
///
/// Projects are created and updated out-of-band by operators; the broker
/// core only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProjectRecord {
    /// Stable lowercase identifier, unique across the store.
    pub project_id: ProjectId,

    /// Display name.
    pub name: String,

    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,

    /// Owning organization.
    #[serde(default)]
    pub organization: Option<String>,

    /// Opaque fingerprint of the project api-key, checked at token issuance.
    pub api_key_hash: String,

    /// Models this project may invoke. Must be non-empty for active projects.
    pub allowed_models: Vec<ModelId>,

    /// Lifecycle status.
    pub status: ProjectStatus,

    /// Remaining budget in USD, non-negative, two-decimal precision.
    pub budget_remaining: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// Whether the project can currently authenticate and invoke models.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::Active
    }

    /// Whether the given model is on this project's allow-list.
    #[must_use]
    pub fn allows_model(&self, model: &ModelId) -> bool {
        self.allowed_models.iter().any(|m| m == model)
    }
}
