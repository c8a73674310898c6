use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bradax_core::error::ErrorCategory;
use bradax_core::guardrail::{ContentType, RuleAction, RuleSeverity};
use bradax_core::invoke::Usage;
use bradax_core::types::{ModelId, ProjectId, RequestId, RuleId};

/// Maximum length of an interaction-stage summary; longer strings are cut.
const MAX_SUMMARY_LEN: usize = 160;

/// An event in the main telemetry stream.
///
/// Events are append-only and never mutated after write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TelemetryKind,
}

/// Type-specific payload of a [`TelemetryEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TelemetryKind {
    RequestStart {
        request_id: RequestId,
        project_id: ProjectId,
        model: ModelId,
        endpoint: String,
    },
    RequestComplete {
        request_id: RequestId,
        project_id: ProjectId,
        success: bool,
        duration_ms: u64,
        model_used: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        guardrails_triggered: bool,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<ProjectId>,
        category: ErrorCategory,
        code: String,
        message: String,
    },
    Authentication {
        project_id: ProjectId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl TelemetryEvent {
    /// Wrap a payload with a fresh event id and the current UTC time.
    #[must_use]
    pub fn new(kind: TelemetryKind) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The project this event belongs to, when it carries one.
    #[must_use]
    pub fn project_id(&self) -> Option<&ProjectId> {
        match &self.kind {
            TelemetryKind::RequestStart { project_id, .. }
            | TelemetryKind::RequestComplete { project_id, .. }
            | TelemetryKind::Authentication { project_id, .. } => Some(project_id),
            TelemetryKind::Error { project_id, .. } => project_id.as_ref(),
        }
    }
}

/// An event in the segregated guardrail stream, one per triggered rule.
///
/// `violation_details` carries a redacted excerpt, never raw content beyond
/// what is necessary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub rule_id: RuleId,
    pub action: RuleAction,
    pub severity: RuleSeverity,
    pub content_type: ContentType,
    pub violation_details: String,
}

impl GuardrailEvent {
    #[must_use]
    pub fn new(
        request_id: RequestId,
        project_id: ProjectId,
        rule_id: RuleId,
        action: RuleAction,
        severity: RuleSeverity,
        content_type: ContentType,
        violation_details: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request_id,
            project_id,
            rule_id,
            action,
            severity,
            content_type,
            violation_details: violation_details.into(),
        }
    }
}

/// Pipeline step recorded in the bounded interaction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Auth,
    Policy,
    GuardIn,
    ProviderCall,
    GuardOut,
}

/// Outcome of a pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Pass,
    Blocked,
    Error,
}

/// A forensic record of one pipeline stage for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionStage {
    pub interaction_id: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub stage: Stage,
    pub summary: String,
    pub result: StageOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl InteractionStage {
    #[must_use]
    pub fn new(
        request_id: RequestId,
        project_id: ProjectId,
        stage: Stage,
        summary: impl Into<String>,
        result: StageOutcome,
    ) -> Self {
        let mut summary = summary.into();
        if summary.len() > MAX_SUMMARY_LEN {
            let mut cut = MAX_SUMMARY_LEN;
            while !summary.is_char_boundary(cut) {
                cut -= 1;
            }
            summary.truncate(cut);
        }
        Self {
            interaction_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            request_id,
            project_id,
            stage,
            summary,
            result,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_event_serde_roundtrip() {
        let event = TelemetryEvent::new(TelemetryKind::RequestComplete {
            request_id: RequestId::new("r-1"),
            project_id: ProjectId::new("proj_real_001"),
            success: true,
            duration_ms: 412,
            model_used: "gpt-4.1-nano".to_owned(),
            usage: Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 30,
                total_tokens: 42,
                cost_usd: Some(0.0011),
            }),
            guardrails_triggered: false,
        });
        let json = serde_json::to_string(&event).unwrap();
        let back: TelemetryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_type_tag_is_snake_case() {
        let event = TelemetryEvent::new(TelemetryKind::Authentication {
            project_id: ProjectId::new("proj_real_001"),
            success: false,
            reason: Some("auth_expired".to_owned()),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "authentication");
        assert_eq!(json["success"], false);
    }

    #[test]
    fn error_event_carries_category() {
        let event = TelemetryEvent::new(TelemetryKind::Error {
            request_id: None,
            project_id: Some(ProjectId::new("proj_real_001")),
            category: ErrorCategory::ProviderError,
            code: "provider_timeout".to_owned(),
            message: "deadline exceeded".to_owned(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "provider_error");
        assert_eq!(event.project_id().unwrap().as_str(), "proj_real_001");
    }

    #[test]
    fn interaction_summary_is_bounded() {
        let long = "x".repeat(500);
        let stage = InteractionStage::new(
            RequestId::new("r-1"),
            ProjectId::new("proj_real_001"),
            Stage::GuardIn,
            long,
            StageOutcome::Pass,
        );
        assert!(stage.summary.len() <= 160);
    }

    #[test]
    fn guardrail_event_serde_roundtrip() {
        let event = GuardrailEvent::new(
            RequestId::new("r-1"),
            ProjectId::new("proj_real_001"),
            RuleId::new("no_python"),
            RuleAction::Block,
            RuleSeverity::High,
            ContentType::Prompt,
            "pattern src matched",
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: GuardrailEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
