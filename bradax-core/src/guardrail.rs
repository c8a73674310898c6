use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::RuleId;

/// Rule grouping used for reporting and policy ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    ContentSafety,
    Business,
    Compliance,
    Other,
}

impl Default for RuleCategory {
    fn default() -> Self {
        Self::Other
    }
}

/// Severity of a rule violation.
///
/// The derived order is the reporting order: `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Action a rule takes when it triggers.
///
/// The derived order is the dominance order used to aggregate a request's
/// triggers: `block > sanitize > flag > allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Flag,
    Sanitize,
    Block,
}

/// What kind of content an evaluation ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Prompt,
    Response,
}

/// The wire shape of a guardrail rule.
///
/// This is both the record format of `data/guardrails.json` and the shape
/// callers submit in `custom_guardrails`. Compilation into an evaluatable
/// rule (regex validation included) happens in `bradax-guardrails`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GuardrailSpec {
    /// Unique rule identifier.
    pub rule_id: RuleId,

    /// Display name; defaults to the rule id.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub category: RuleCategory,

    pub severity: RuleSeverity,

    pub action: RuleAction,

    /// Named regex patterns. Names double as keywords during matching.
    /// A `BTreeMap` keeps the combined alternation order deterministic.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = std::collections::HashMap<String, String>))]
    pub patterns: BTreeMap<String, String>,

    /// Case-insensitive keyword set.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Substrings that suppress this rule entirely when present.
    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl GuardrailSpec {
    /// Display name, falling back to the rule id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.rule_id.as_str())
    }
}
