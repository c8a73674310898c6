use std::collections::HashSet;

use regex::{Regex, RegexBuilder};

use bradax_core::guardrail::{GuardrailSpec, RuleAction, RuleSeverity};
use bradax_core::types::RuleId;

use crate::error::GuardrailError;

/// Replacement token used when sanitizing matched content.
pub const REDACTION_TOKEN: &str = "[REDACTED]";

/// A guardrail spec compiled into an evaluatable form.
///
/// All regexes compile at construction time; evaluation cannot fail.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub spec: GuardrailSpec,
    /// All named patterns combined into one alternation, case-insensitive.
    pattern: Option<Regex>,
    /// Effective keyword set (configured keywords plus pattern names),
    /// lowercased for containment checks.
    keywords: Vec<String>,
    /// Lowercased whitelist substrings.
    whitelist: Vec<String>,
    /// Per-keyword literal regexes used for sanitization.
    keyword_regexes: Vec<Regex>,
}

/// A single rule firing against a piece of content.
#[derive(Debug, Clone)]
pub struct RuleTrigger {
    pub rule_id: RuleId,
    pub action: RuleAction,
    pub severity: RuleSeverity,
    /// Redacted match descriptions (keyword names, pattern hit counts).
    pub details: Vec<String>,
}

impl CompiledRule {
    /// Validate and compile a spec.
    ///
    /// Fails if any named pattern does not compile, or if the rule's action
    /// is `sanitize` with nothing to match.
    pub fn compile(spec: GuardrailSpec) -> Result<Self, GuardrailError> {
        for (name, pattern) in &spec.patterns {
            Regex::new(pattern).map_err(|e| GuardrailError::InvalidPattern {
                rule_id: spec.rule_id.clone(),
                name: name.clone(),
                message: e.to_string(),
            })?;
        }

        let pattern = if spec.patterns.is_empty() {
            None
        } else {
            let combined = spec
                .patterns
                .values()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join("|");
            Some(
                RegexBuilder::new(&combined)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| GuardrailError::InvalidPattern {
                        rule_id: spec.rule_id.clone(),
                        name: "<combined>".to_owned(),
                        message: e.to_string(),
                    })?,
            )
        };

        let mut keywords: Vec<String> = Vec::new();
        for keyword in spec.keywords.iter().chain(spec.patterns.keys()) {
            let lowered = keyword.to_lowercase();
            if !lowered.is_empty() && !keywords.contains(&lowered) {
                keywords.push(lowered);
            }
        }

        if spec.action == RuleAction::Sanitize && keywords.is_empty() && pattern.is_none() {
            return Err(GuardrailError::UnmatchableSanitize(spec.rule_id));
        }

        let keyword_regexes = keywords
            .iter()
            .map(|kw| {
                RegexBuilder::new(&regex::escape(kw))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| GuardrailError::InvalidPattern {
                        rule_id: spec.rule_id.clone(),
                        name: kw.clone(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let whitelist = spec
            .whitelist
            .iter()
            .map(|w| w.to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        Ok(Self {
            spec,
            pattern,
            keywords,
            whitelist,
            keyword_regexes,
        })
    }

    pub fn rule_id(&self) -> &RuleId {
        &self.spec.rule_id
    }

    pub fn enabled(&self) -> bool {
        self.spec.enabled
    }

    /// Evaluate this rule against content.
    ///
    /// `content_lower` must be the lowercased form of `content`; it is
    /// passed in so the engine lowercases once per evaluation, not per rule.
    /// Whitelist suppression is rule-local: a whitelisted match skips this
    /// rule only.
    #[must_use]
    pub fn matches(&self, content: &str, content_lower: &str) -> Option<RuleTrigger> {
        if self.whitelist.iter().any(|w| content_lower.contains(w.as_str())) {
            return None;
        }

        let mut details = Vec::new();

        for keyword in &self.keywords {
            if content_lower.contains(keyword.as_str()) {
                details.push(format!("keyword detected: {keyword}"));
            }
        }

        if let Some(pattern) = &self.pattern {
            let hits = pattern.find_iter(content).count();
            if hits > 0 {
                details.push(format!("pattern matched: {hits} occurrence(s)"));
            }
        }

        if details.is_empty() {
            return None;
        }

        Some(RuleTrigger {
            rule_id: self.spec.rule_id.clone(),
            action: self.spec.action,
            severity: self.spec.severity,
            details,
        })
    }

    /// Replace every keyword occurrence and every pattern hit with
    /// [`REDACTION_TOKEN`].
    #[must_use]
    pub fn sanitize(&self, content: &str) -> String {
        let mut sanitized = content.to_owned();
        for keyword_regex in &self.keyword_regexes {
            sanitized = keyword_regex
                .replace_all(&sanitized, REDACTION_TOKEN)
                .into_owned();
        }
        if let Some(pattern) = &self.pattern {
            sanitized = pattern.replace_all(&sanitized, REDACTION_TOKEN).into_owned();
        }
        sanitized
    }
}

/// An immutable, fully validated set of compiled rules.
///
/// Request handlers capture an `Arc<RuleSet>` snapshot on entry, so a
/// concurrent reload never mixes old and new rules within one evaluation.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile a list of specs, enforcing unique rule ids.
    pub fn compile(specs: Vec<GuardrailSpec>) -> Result<Self, GuardrailError> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.rule_id.clone()) {
                return Err(GuardrailError::DuplicateRule(spec.rule_id));
            }
            rules.push(CompiledRule::compile(spec)?);
        }
        Ok(Self { rules })
    }

    /// A transient set extending this one with caller-provided rules.
    /// The base set is untouched; the composition lives only for the
    /// request that built it.
    #[must_use]
    pub fn compose(&self, extra: &Self) -> Self {
        let mut rules = self.rules.clone();
        rules.extend(extra.rules.iter().cloned());
        Self { rules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Number of enabled rules.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled()).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The wire specs of all enabled rules, in load order.
    #[must_use]
    pub fn enabled_specs(&self) -> Vec<&GuardrailSpec> {
        self.rules
            .iter()
            .filter(|r| r.enabled())
            .map(|r| &r.spec)
            .collect()
    }
}
