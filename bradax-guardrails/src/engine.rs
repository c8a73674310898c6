use std::sync::Arc;

use tracing::{debug, warn};

use bradax_core::guardrail::{ContentType, RuleAction, RuleSeverity};
use bradax_core::types::{ProjectId, RequestId, RuleId};
use bradax_telemetry::{GuardrailEvent, TelemetryWriter};

use crate::error::GuardrailError;
use crate::rule::{RuleSet, RuleTrigger};

/// Evaluation metadata echoed in every result.
#[derive(Debug, Clone)]
pub struct EvaluationMetadata {
    pub content_type: ContentType,
    pub project_id: ProjectId,
    pub total_rules_checked: usize,
}

/// Aggregated outcome of one content evaluation.
#[derive(Debug, Clone)]
pub struct GuardrailResult {
    /// `false` exactly when the dominant action is `block`.
    pub allowed: bool,
    /// Ids of every rule that fired, in rule order.
    pub triggered_rules: Vec<RuleId>,
    /// Dominant action under `block > sanitize > flag > allow`.
    pub action: RuleAction,
    /// Highest severity across triggers.
    pub severity: RuleSeverity,
    /// Present only when the dominant action is `sanitize`.
    pub sanitized_content: Option<String>,
    pub reason: String,
    pub metadata: EvaluationMetadata,
}

impl GuardrailResult {
    /// Whether any rule fired.
    #[must_use]
    pub fn triggered(&self) -> bool {
        !self.triggered_rules.is_empty()
    }
}

/// The deterministic content evaluator.
///
/// Stateless across requests: the rule set to evaluate against is passed in
/// per call, so a snapshot captured at request entry stays coherent even if
/// the store reloads mid-flight. The only side effect is one guardrail
/// event per triggered rule, written through the telemetry writer.
pub struct GuardrailEngine {
    writer: Arc<TelemetryWriter>,
}

impl GuardrailEngine {
    pub fn new(writer: Arc<TelemetryWriter>) -> Self {
        Self { writer }
    }

    /// Evaluate `content` against every enabled rule in `rules`.
    ///
    /// The content itself is never mutated; sanitization produces a copy in
    /// the result. A telemetry failure while recording a trigger propagates
    /// as an error, which callers treat as a blocked request.
    pub async fn evaluate(
        &self,
        rules: &RuleSet,
        content: &str,
        content_type: ContentType,
        project_id: &ProjectId,
        request_id: &RequestId,
    ) -> Result<GuardrailResult, GuardrailError> {
        let content_lower = content.to_lowercase();
        let mut triggers: Vec<RuleTrigger> = Vec::new();

        for rule in rules.iter().filter(|r| r.enabled()) {
            if let Some(trigger) = rule.matches(content, &content_lower) {
                debug!(
                    rule_id = %trigger.rule_id,
                    action = ?trigger.action,
                    content_type = content_type_str(content_type),
                    "guardrail rule triggered"
                );
                triggers.push(trigger);
            }
        }

        let action = triggers
            .iter()
            .map(|t| t.action)
            .max()
            .unwrap_or(RuleAction::Allow);
        let severity = triggers
            .iter()
            .map(|t| t.severity)
            .max()
            .unwrap_or(RuleSeverity::Low);
        let allowed = action != RuleAction::Block;

        let sanitized_content = if action == RuleAction::Sanitize {
            let mut sanitized = content.to_owned();
            for rule in rules.iter().filter(|r| r.enabled()) {
                if rule.spec.action == RuleAction::Sanitize
                    && triggers.iter().any(|t| &t.rule_id == rule.rule_id())
                {
                    sanitized = rule.sanitize(&sanitized);
                }
            }
            Some(sanitized)
        } else {
            None
        };

        for trigger in &triggers {
            let event = GuardrailEvent::new(
                request_id.clone(),
                project_id.clone(),
                trigger.rule_id.clone(),
                trigger.action,
                trigger.severity,
                content_type,
                trigger.details.join("; "),
            );
            self.writer.record_guardrail(&event).await?;
        }

        if !allowed {
            warn!(
                project_id = %project_id,
                triggered = triggers.len(),
                "guardrail blocked content"
            );
        }

        let reason = match action {
            RuleAction::Allow => "approved".to_owned(),
            RuleAction::Flag => format!("flagged by {} rule(s)", triggers.len()),
            RuleAction::Sanitize => "content sanitized".to_owned(),
            RuleAction::Block => format!(
                "blocked by {} rule(s)",
                triggers.iter().filter(|t| t.action == RuleAction::Block).count()
            ),
        };

        Ok(GuardrailResult {
            allowed,
            triggered_rules: triggers.into_iter().map(|t| t.rule_id).collect(),
            action,
            severity,
            sanitized_content,
            reason,
            metadata: EvaluationMetadata {
                content_type,
                project_id: project_id.clone(),
                total_rules_checked: rules.enabled_count(),
            },
        })
    }
}

fn content_type_str(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Prompt => "prompt",
        ContentType::Response => "response",
    }
}
