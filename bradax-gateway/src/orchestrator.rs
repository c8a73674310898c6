use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use bradax_core::error::ErrorCategory;
use bradax_core::guardrail::{ContentType, RuleAction};
use bradax_core::invoke::{
    ChatMessage, InvokeRequest, InvokeResponse, Operation, ReasonCode, Usage,
};
use bradax_core::principal::Principal;
use bradax_core::types::{ProjectId, RequestId, RuleId};
use bradax_guardrails::{GuardrailEngine, GuardrailError, RuleSet, RuleStore};
use bradax_provider::{InvokeParams, ProviderAdapter, ProviderError};
use bradax_store::{ModelCatalog, ProjectStore};
use bradax_telemetry::{
    InteractionStage, Stage, StageOutcome, TelemetryEvent, TelemetryKind, TelemetryWriter,
};

use crate::error::GatewayError;
use crate::metrics::DispatchMetrics;

/// Drives the per-request pipeline:
/// policy check → guard-in → provider call → guard-out → completion record.
///
/// Every handled failure yields a fail-soft envelope (`success=false`, a
/// stable reason code, and a `model_used` sentinel for the terminal step).
/// Only infrastructure failures (telemetry, store IO) escape as errors.
pub struct Orchestrator {
    pub(crate) projects: Arc<ProjectStore>,
    pub(crate) catalog: Arc<ModelCatalog>,
    pub(crate) rules: Arc<RuleStore>,
    pub(crate) engine: GuardrailEngine,
    pub(crate) provider: Arc<dyn ProviderAdapter>,
    pub(crate) writer: Arc<TelemetryWriter>,
    pub(crate) provider_timeout: Duration,
    pub(crate) metrics: Arc<DispatchMetrics>,
}

impl Orchestrator {
    /// Dispatch one verified invocation through the full pipeline.
    #[instrument(
        skip(self, principal, request),
        fields(
            project_id = %request.project_id,
            model = %request.model,
            operation = ?request.operation,
        )
    )]
    pub async fn invoke(
        &self,
        principal: &Principal,
        request: InvokeRequest,
    ) -> Result<InvokeResponse, GatewayError> {
        let started = Instant::now();
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(RequestId::generate);
        let project_id = request.project_id.clone();
        self.metrics.increment_invoked();

        self.writer
            .record_event(&TelemetryEvent::new(TelemetryKind::RequestStart {
                request_id: request_id.clone(),
                project_id: project_id.clone(),
                model: request.model.clone(),
                endpoint: "/api/v1/llm/invoke".to_owned(),
            }))
            .await?;

        self.stage(
            &request_id,
            &project_id,
            Stage::Auth,
            format!("token verified for {}", principal.project_id),
            StageOutcome::Pass,
        )
        .await?;

        // Shape checks that survive serde: unsupported operation, empty payload.
        if request.operation == Operation::Stream {
            self.metrics.increment_validation_errors();
            return self
                .finish_fail_soft(
                    &request_id,
                    &project_id,
                    ReasonCode::ValidationError,
                    "operation_unsupported",
                    "streaming responses are not supported".to_owned(),
                    Vec::new(),
                    started,
                )
                .await;
        }
        let Some(mut messages) = request.payload.to_messages() else {
            self.metrics.increment_validation_errors();
            return self
                .finish_fail_soft(
                    &request_id,
                    &project_id,
                    ReasonCode::ValidationError,
                    "payload_empty",
                    "payload carries neither messages nor a prompt".to_owned(),
                    Vec::new(),
                    started,
                )
                .await;
        };

        // Policy check: the model must be on the project's allow-list. A
        // blocked policy never reaches the provider adapter.
        let project = match self.projects.get(&project_id) {
            Ok(project) => project,
            Err(bradax_store::StoreError::UnknownProject(_)) => {
                self.metrics.increment_policy_blocked();
                self.stage(&request_id, &project_id, Stage::Policy, "project unknown", StageOutcome::Blocked)
                    .await?;
                return self
                    .finish_fail_soft(
                        &request_id,
                        &project_id,
                        ReasonCode::PolicyBlocked,
                        "project_unknown",
                        format!("project '{project_id}' is not registered"),
                        Vec::new(),
                        started,
                    )
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        if !project.is_active() || !project.allows_model(&request.model) {
            self.metrics.increment_policy_blocked();
            self.stage(
                &request_id,
                &project_id,
                Stage::Policy,
                format!("model {} not allowed", request.model),
                StageOutcome::Blocked,
            )
            .await?;
            return self
                .finish_fail_soft(
                    &request_id,
                    &project_id,
                    ReasonCode::PolicyBlocked,
                    "model_not_allowed",
                    format!("model '{}' is not allowed for this project", request.model),
                    Vec::new(),
                    started,
                )
                .await;
        }
        self.stage(&request_id, &project_id, Stage::Policy, "model allowed", StageOutcome::Pass)
            .await?;

        // Guard-in over a transient rule set: the base snapshot captured
        // here plus any caller-provided custom rules, which are validated
        // before use and never touch the shared set.
        let base = self.rules.snapshot();
        let composed;
        let ruleset: &RuleSet = match &request.custom_guardrails {
            None => &base,
            Some(specs) => match RuleSet::compile(specs.clone()) {
                Ok(custom) => {
                    composed = base.compose(&custom);
                    &composed
                }
                Err(e @ (GuardrailError::InvalidPattern { .. }
                | GuardrailError::DuplicateRule(_)
                | GuardrailError::UnmatchableSanitize(_))) => {
                    self.metrics.increment_validation_errors();
                    self.stage(
                        &request_id,
                        &project_id,
                        Stage::GuardIn,
                        "custom rules rejected",
                        StageOutcome::Error,
                    )
                    .await?;
                    return self
                        .finish_fail_soft(
                            &request_id,
                            &project_id,
                            ReasonCode::ValidationError,
                            "custom_guardrail_invalid",
                            e.to_string(),
                            Vec::new(),
                            started,
                        )
                        .await;
                }
                Err(e) => return Err(e.into()),
            },
        };

        let prompt_text = joined_content(&messages);
        let guard_in = self
            .engine
            .evaluate(ruleset, &prompt_text, ContentType::Prompt, &project_id, &request_id)
            .await?;

        if !guard_in.allowed {
            self.metrics.increment_guardrail_blocked();
            self.stage(&request_id, &project_id, Stage::GuardIn, &guard_in.reason, StageOutcome::Blocked)
                .await?;
            return self
                .finish_fail_soft(
                    &request_id,
                    &project_id,
                    ReasonCode::GuardrailBlocked,
                    "guardrail_blocked_input",
                    guard_in.reason.clone(),
                    guard_in.triggered_rules,
                    started,
                )
                .await;
        }

        let mut triggered = guard_in.triggered_rules.clone();
        if guard_in.action == RuleAction::Sanitize {
            self.metrics.increment_sanitized();
            sanitize_messages(&mut messages, ruleset, &guard_in.triggered_rules);
        }
        self.stage(&request_id, &project_id, Stage::GuardIn, &guard_in.reason, StageOutcome::Pass)
            .await?;

        // Provider call under the configured deadline.
        let params = InvokeParams {
            max_tokens: request.payload.max_tokens,
            temperature: request.payload.temperature,
        };
        let call = tokio::time::timeout(
            self.provider_timeout,
            self.provider.invoke(&request.model, &messages, &params),
        )
        .await;

        let completion = match call {
            Err(_elapsed) => {
                return self
                    .provider_failure(
                        &request_id,
                        &project_id,
                        ProviderError::Timeout(self.provider_timeout),
                        triggered,
                        started,
                    )
                    .await;
            }
            Ok(Err(e)) => {
                return self
                    .provider_failure(&request_id, &project_id, e, triggered, started)
                    .await;
            }
            Ok(Ok(completion)) => completion,
        };
        self.stage(&request_id, &project_id, Stage::ProviderCall, "provider responded", StageOutcome::Pass)
            .await?;

        // Guard-out over the provider's text, same engine and rule set.
        let guard_out = self
            .engine
            .evaluate(ruleset, &completion.text, ContentType::Response, &project_id, &request_id)
            .await?;
        triggered.extend(guard_out.triggered_rules.iter().cloned());

        if !guard_out.allowed {
            self.metrics.increment_guardrail_blocked();
            self.stage(&request_id, &project_id, Stage::GuardOut, &guard_out.reason, StageOutcome::Blocked)
                .await?;
            self.writer
                .capture_raw_response(&request_id, &completion.raw)
                .await?;
            return self
                .finish_fail_soft(
                    &request_id,
                    &project_id,
                    ReasonCode::GuardrailBlocked,
                    "guardrail_blocked_output",
                    guard_out.reason.clone(),
                    triggered,
                    started,
                )
                .await;
        }

        let content = if guard_out.action == RuleAction::Sanitize {
            self.metrics.increment_sanitized();
            guard_out
                .sanitized_content
                .clone()
                .unwrap_or_else(|| completion.text.clone())
        } else {
            completion.text.clone()
        };
        self.stage(&request_id, &project_id, Stage::GuardOut, &guard_out.reason, StageOutcome::Pass)
            .await?;

        let usage = completion.usage.map(|mut usage: Usage| {
            usage.cost_usd = self.catalog.estimate_cost(&request.model, usage.total_tokens);
            usage
        });

        let duration_ms = elapsed_ms(started);
        self.writer
            .record_event(&TelemetryEvent::new(TelemetryKind::RequestComplete {
                request_id: request_id.clone(),
                project_id: project_id.clone(),
                success: true,
                duration_ms,
                model_used: request.model.to_string(),
                usage: usage.clone(),
                guardrails_triggered: !triggered.is_empty(),
            }))
            .await?;
        self.metrics.increment_completed();
        info!(request_id = %request_id, duration_ms, "invocation completed");

        let mut response = InvokeResponse::ok(request_id, request.model.as_str(), content)
            .with_triggered_rules(triggered);
        if let Some(usage) = usage {
            response = response.with_usage(usage);
        }
        Ok(response)
    }

    /// Current metrics counters.
    #[must_use]
    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// The provider adapter's name, reported by system info.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn provider_failure(
        &self,
        request_id: &RequestId,
        project_id: &ProjectId,
        error: ProviderError,
        triggered: Vec<RuleId>,
        started: Instant,
    ) -> Result<InvokeResponse, GatewayError> {
        self.metrics.increment_provider_errors();
        warn!(request_id = %request_id, error = %error, "provider call failed");
        self.stage(request_id, project_id, Stage::ProviderCall, error.to_string(), StageOutcome::Error)
            .await?;

        // Persist whatever the upstream gave us for forensics.
        let raw = match &error {
            ProviderError::RemoteStatus { status, body } => {
                serde_json::json!({ "status": status, "body": body })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        self.writer.capture_raw_response(request_id, &raw).await?;

        let (reason, code) = if error.is_timeout() {
            (ReasonCode::ProviderTimeout, "provider_timeout")
        } else {
            (ReasonCode::ProviderError, "provider_error")
        };
        self.finish_fail_soft(
            request_id,
            project_id,
            reason,
            code,
            error.to_string(),
            triggered,
            started,
        )
        .await
    }

    /// Record the error event and the completion for a handled failure,
    /// then build the fail-soft envelope.
    async fn finish_fail_soft(
        &self,
        request_id: &RequestId,
        project_id: &ProjectId,
        reason: ReasonCode,
        code: &str,
        message: String,
        triggered: Vec<RuleId>,
        started: Instant,
    ) -> Result<InvokeResponse, GatewayError> {
        self.writer
            .record_event(&TelemetryEvent::new(TelemetryKind::Error {
                request_id: Some(request_id.clone()),
                project_id: Some(project_id.clone()),
                category: category_for(reason),
                code: code.to_owned(),
                message,
            }))
            .await?;

        self.writer
            .record_event(&TelemetryEvent::new(TelemetryKind::RequestComplete {
                request_id: request_id.clone(),
                project_id: project_id.clone(),
                success: false,
                duration_ms: elapsed_ms(started),
                model_used: reason.model_sentinel().to_owned(),
                usage: None,
                guardrails_triggered: !triggered.is_empty(),
            }))
            .await?;

        Ok(InvokeResponse::fail_soft(request_id.clone(), reason).with_triggered_rules(triggered))
    }

    async fn stage(
        &self,
        request_id: &RequestId,
        project_id: &ProjectId,
        stage: Stage,
        summary: impl Into<String>,
        result: StageOutcome,
    ) -> Result<(), GatewayError> {
        let entry = InteractionStage::new(
            request_id.clone(),
            project_id.clone(),
            stage,
            summary,
            result,
        );
        self.writer.record_interaction(&entry).await?;
        Ok(())
    }
}

fn category_for(reason: ReasonCode) -> ErrorCategory {
    match reason {
        ReasonCode::GuardrailBlocked => ErrorCategory::GuardrailBlocked,
        ReasonCode::PolicyBlocked => ErrorCategory::Authorization,
        ReasonCode::ValidationError => ErrorCategory::Validation,
        ReasonCode::ProviderError | ReasonCode::ProviderTimeout => ErrorCategory::ProviderError,
    }
}

fn joined_content(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Rewrite each message through the sanitize rules that fired.
fn sanitize_messages(messages: &mut [ChatMessage], rules: &RuleSet, triggered: &[RuleId]) {
    for rule in rules.iter().filter(|r| r.enabled()) {
        if rule.spec.action == RuleAction::Sanitize && triggered.contains(rule.rule_id()) {
            for message in messages.iter_mut() {
                message.content = rule.sanitize(&message.content);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use bradax_core::invoke::InvokePayload;
    use bradax_core::project::{ProjectRecord, ProjectStatus};
    use bradax_core::types::ModelId;
    use bradax_provider::Completion;
    use bradax_store::write_atomic;

    use super::*;
    use crate::builder::OrchestratorBuilder;

    // -- Mock providers -------------------------------------------------------

    struct MockProvider {
        text: String,
    }

    impl MockProvider {
        fn new(text: &str) -> Self {
            Self {
                text: text.to_owned(),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn invoke(
            &self,
            _model: &ModelId,
            _messages: &[ChatMessage],
            _params: &InvokeParams,
        ) -> Result<Completion, ProviderError> {
            Ok(Completion {
                text: self.text.clone(),
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 20,
                    total_tokens: 30,
                    cost_usd: None,
                }),
                raw: serde_json::json!({"choices": [{"message": {"content": self.text}}]}),
            })
        }
    }

    struct CapturingProvider {
        captured: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl CapturingProvider {
        fn new() -> (Self, Arc<Mutex<Vec<Vec<ChatMessage>>>>) {
            let captured = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    captured: Arc::clone(&captured),
                },
                captured,
            )
        }
    }

    #[async_trait]
    impl ProviderAdapter for CapturingProvider {
        fn name(&self) -> &str {
            "capturing"
        }

        async fn invoke(
            &self,
            _model: &ModelId,
            messages: &[ChatMessage],
            _params: &InvokeParams,
        ) -> Result<Completion, ProviderError> {
            self.captured.lock().unwrap().push(messages.to_vec());
            Ok(Completion {
                text: "captured".to_owned(),
                usage: None,
                raw: serde_json::Value::Null,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ProviderAdapter for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(
            &self,
            _model: &ModelId,
            _messages: &[ChatMessage],
            _params: &InvokeParams,
        ) -> Result<Completion, ProviderError> {
            Err(ProviderError::RemoteStatus {
                status: 503,
                body: "upstream overloaded".to_owned(),
            })
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl ProviderAdapter for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(
            &self,
            _model: &ModelId,
            _messages: &[ChatMessage],
            _params: &InvokeParams,
        ) -> Result<Completion, ProviderError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Completion {
                text: "too late".to_owned(),
                usage: None,
                raw: serde_json::Value::Null,
            })
        }
    }

    // -- Fixtures -------------------------------------------------------------

    fn project(id: &str, status: ProjectStatus, models: &[&str]) -> ProjectRecord {
        ProjectRecord {
            project_id: ProjectId::new(id),
            name: id.to_uppercase(),
            description: None,
            organization: Some("acme".to_owned()),
            api_key_hash: "a1b2c3d4e5f60718".to_owned(),
            allowed_models: models.iter().map(|m| ModelId::new(*m)).collect(),
            status,
            budget_remaining: 100.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn build(
        dir: &tempfile::TempDir,
        rules_json: &str,
        provider: Arc<dyn ProviderAdapter>,
    ) -> (Orchestrator, Arc<TelemetryWriter>) {
        let projects = vec![
            project("proj_real_001", ProjectStatus::Active, &["gpt-4.1-nano"]),
            project("proj_real_002", ProjectStatus::Active, &["gpt-4.1-mini"]),
            project("proj_idle", ProjectStatus::Inactive, &["gpt-4.1-nano"]),
        ];
        let projects_path = dir.path().join("projects.json");
        write_atomic(&projects_path, &serde_json::to_vec_pretty(&projects).unwrap()).unwrap();

        let rules_path = dir.path().join("guardrails.json");
        std::fs::write(&rules_path, rules_json).unwrap();

        let catalog_path = dir.path().join("llm_models.json");
        std::fs::write(
            &catalog_path,
            r#"[{"model_id": "gpt-4.1-nano", "name": "GPT-4.1 Nano",
                 "max_tokens": 128000, "cost_per_1k_usd": 0.000025}]"#,
        )
        .unwrap();

        let writer = Arc::new(TelemetryWriter::new(dir.path()).unwrap());
        let orchestrator = OrchestratorBuilder::new()
            .projects(Arc::new(ProjectStore::load(projects_path).unwrap()))
            .catalog(Arc::new(bradax_store::ModelCatalog::load(catalog_path).unwrap()))
            .rules(Arc::new(RuleStore::load(rules_path).unwrap()))
            .provider(provider)
            .writer(Arc::clone(&writer))
            .provider_timeout(Duration::from_millis(100))
            .build()
            .expect("orchestrator should build");
        (orchestrator, writer)
    }

    fn principal() -> Principal {
        Principal {
            project_id: ProjectId::new("proj_real_001"),
            organization: Some("acme".to_owned()),
            scopes: vec!["llm:invoke".to_owned(), "llm:models".to_owned()],
            expires_at: Utc::now() + chrono::Duration::minutes(15),
        }
    }

    fn request(model: &str, prompt: &str) -> InvokeRequest {
        InvokeRequest {
            operation: Operation::Chat,
            model: ModelId::new(model),
            payload: InvokePayload {
                messages: Some(vec![ChatMessage::user(prompt)]),
                ..InvokePayload::default()
            },
            project_id: ProjectId::new("proj_real_001"),
            custom_guardrails: None,
            request_id: None,
        }
    }

    fn no_python_rule() -> bradax_core::guardrail::GuardrailSpec {
        serde_json::from_str(
            r#"{"rule_id": "no_python", "severity": "high", "action": "block",
                "patterns": {"src": "(?i)python|def |import "}}"#,
        )
        .unwrap()
    }

    // -- Tests ----------------------------------------------------------------

    #[tokio::test]
    async fn happy_path_completes_with_usage_and_cost() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, writer) = build(
            &dir,
            "[]",
            Arc::new(MockProvider::new("Fernando Henrique Cardoso")),
        );

        let resp = orch
            .invoke(&principal(), request("gpt-4.1-nano", "Who was president of Brazil in 2002?"))
            .await
            .unwrap();

        assert!(resp.success);
        assert_eq!(resp.model_used, "gpt-4.1-nano");
        assert_eq!(resp.content.as_deref(), Some("Fernando Henrique Cardoso"));
        assert_eq!(resp.guardrails_triggered, Some(false));
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 30);
        assert!((usage.cost_usd.unwrap() - 30.0 / 1000.0 * 0.000025).abs() < 1e-12);

        // Exactly one start and one complete with the same request id.
        let events = writer.read_events().await.unwrap();
        let starts: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, TelemetryKind::RequestStart { .. }))
            .collect();
        let completes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e.kind, TelemetryKind::RequestComplete { .. }))
            .collect();
        assert_eq!(starts.len(), 1);
        assert_eq!(completes.len(), 1);

        let snap = orch.metrics().snapshot();
        assert_eq!(snap.invoked, 1);
        assert_eq!(snap.completed, 1);
    }

    #[tokio::test]
    async fn disallowed_model_never_reaches_provider() {
        let dir = tempfile::tempdir().unwrap();
        let (capturing, captured) = CapturingProvider::new();
        let (orch, writer) = build(&dir, "[]", Arc::new(capturing));

        let resp = orch
            .invoke(&principal(), request("gpt-9", "hello"))
            .await
            .unwrap();

        assert!(!resp.success);
        assert_eq!(resp.reason_code, Some(ReasonCode::PolicyBlocked));
        assert_eq!(resp.model_used, "policy_blocked");
        assert!(captured.lock().unwrap().is_empty());

        let events = writer.read_events().await.unwrap();
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            TelemetryKind::Error { category: ErrorCategory::Authorization, .. }
        )));
        assert_eq!(orch.metrics().snapshot().policy_blocked, 1);
    }

    #[tokio::test]
    async fn inactive_project_is_policy_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = build(&dir, "[]", Arc::new(MockProvider::new("x")));

        let mut req = request("gpt-4.1-nano", "hello");
        req.project_id = ProjectId::new("proj_idle");
        let resp = orch.invoke(&principal(), req).await.unwrap();
        assert_eq!(resp.reason_code, Some(ReasonCode::PolicyBlocked));
    }

    #[tokio::test]
    async fn custom_guardrail_blocks_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let (capturing, captured) = CapturingProvider::new();
        let (orch, writer) = build(&dir, "[]", Arc::new(capturing));

        let mut req = request("gpt-4.1-nano", "Write python code to sort a list");
        req.custom_guardrails = Some(vec![no_python_rule()]);
        let resp = orch.invoke(&principal(), req).await.unwrap();

        assert!(!resp.success);
        assert_eq!(resp.reason_code, Some(ReasonCode::GuardrailBlocked));
        assert_eq!(resp.model_used, "guardrail_blocked");
        assert_eq!(resp.triggered_rules, Some(vec![RuleId::new("no_python")]));
        assert!(captured.lock().unwrap().is_empty());

        let guardrail_events = writer.read_guardrail_events().await.unwrap();
        assert_eq!(guardrail_events.len(), 1);
        assert_eq!(guardrail_events[0].rule_id, RuleId::new("no_python"));
    }

    #[tokio::test]
    async fn invalid_custom_regex_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let (capturing, captured) = CapturingProvider::new();
        let (orch, _) = build(&dir, "[]", Arc::new(capturing));

        let mut req = request("gpt-4.1-nano", "hello");
        req.custom_guardrails = Some(vec![serde_json::from_str(
            r#"{"rule_id": "bad", "severity": "low", "action": "flag", "patterns": {"p": "("}}"#,
        )
        .unwrap()]);
        let resp = orch.invoke(&principal(), req).await.unwrap();

        assert!(!resp.success);
        assert_eq!(resp.reason_code, Some(ReasonCode::ValidationError));
        assert_eq!(resp.model_used, "validation_error");
        assert!(captured.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_operation_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = build(&dir, "[]", Arc::new(MockProvider::new("x")));

        let mut req = request("gpt-4.1-nano", "hello");
        req.operation = Operation::Stream;
        let resp = orch.invoke(&principal(), req).await.unwrap();
        assert_eq!(resp.reason_code, Some(ReasonCode::ValidationError));
    }

    #[tokio::test]
    async fn empty_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = build(&dir, "[]", Arc::new(MockProvider::new("x")));

        let mut req = request("gpt-4.1-nano", "");
        req.payload = InvokePayload::default();
        let resp = orch.invoke(&principal(), req).await.unwrap();
        assert_eq!(resp.reason_code, Some(ReasonCode::ValidationError));
    }

    #[tokio::test]
    async fn sanitized_prompt_reaches_provider_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let (capturing, captured) = CapturingProvider::new();
        let rules = r#"[{"rule_id": "pii", "severity": "medium", "action": "sanitize",
                         "keywords": ["cpf"],
                         "patterns": {"digits": "\\d{3}\\.\\d{3}\\.\\d{3}-\\d{2}"}}]"#;
        let (orch, _) = build(&dir, rules, Arc::new(capturing));

        let resp = orch
            .invoke(&principal(), request("gpt-4.1-nano", "my CPF is 123.456.789-09"))
            .await
            .unwrap();

        assert!(resp.success);
        assert_eq!(resp.guardrails_triggered, Some(true));

        let sent = captured.lock().unwrap();
        let content = &sent[0][0].content;
        assert!(!content.to_lowercase().contains("cpf"), "got: {content}");
        assert!(!content.contains("123.456.789-09"));
        assert!(content.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn provider_error_is_fail_soft_with_raw_capture() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, writer) = build(&dir, "[]", Arc::new(FailingProvider));

        let mut req = request("gpt-4.1-nano", "hello");
        req.request_id = Some(RequestId::new("r-fail"));
        let resp = orch.invoke(&principal(), req).await.unwrap();

        assert!(!resp.success);
        assert_eq!(resp.reason_code, Some(ReasonCode::ProviderError));
        assert_eq!(resp.model_used, "provider_error");

        let raw_path = writer.raw_response_path(&RequestId::new("r-fail"));
        assert!(raw_path.exists());
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&raw_path).unwrap()).unwrap();
        assert_eq!(raw["status"], 503);
        assert_eq!(orch.metrics().snapshot().provider_errors, 1);
    }

    #[tokio::test]
    async fn provider_deadline_maps_to_timeout_reason() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _) = build(&dir, "[]", Arc::new(SlowProvider));

        let resp = orch
            .invoke(&principal(), request("gpt-4.1-nano", "hello"))
            .await
            .unwrap();

        assert!(!resp.success);
        assert_eq!(resp.reason_code, Some(ReasonCode::ProviderTimeout));
        assert_eq!(resp.model_used, "provider_error");
    }

    #[tokio::test]
    async fn response_guardrail_blocks_output() {
        let dir = tempfile::tempdir().unwrap();
        let rules = r#"[{"rule_id": "no_python", "severity": "high", "action": "block",
                         "patterns": {"src": "(?i)python"}}]"#;
        let (orch, writer) = build(&dir, rules, Arc::new(MockProvider::new("Here is some python")));

        let mut req = request("gpt-4.1-nano", "tell me about snakes");
        req.request_id = Some(RequestId::new("r-out"));
        let resp = orch.invoke(&principal(), req).await.unwrap();

        assert!(!resp.success);
        assert_eq!(resp.reason_code, Some(ReasonCode::GuardrailBlocked));
        assert_eq!(resp.guardrails_triggered, Some(true));

        // The provider's raw body is captured for forensics.
        assert!(writer.raw_response_path(&RequestId::new("r-out")).exists());

        // The guardrail stream carries the response-phase event.
        let events = writer.read_guardrail_events().await.unwrap();
        assert!(events
            .iter()
            .any(|e| e.content_type == ContentType::Response));
    }

    #[tokio::test]
    async fn every_failure_still_records_one_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, writer) = build(&dir, "[]", Arc::new(FailingProvider));

        let _ = orch
            .invoke(&principal(), request("gpt-9", "policy blocked"))
            .await
            .unwrap();
        let _ = orch
            .invoke(&principal(), request("gpt-4.1-nano", "provider fails"))
            .await
            .unwrap();

        let events = writer.read_events().await.unwrap();
        let starts = events
            .iter()
            .filter(|e| matches!(e.kind, TelemetryKind::RequestStart { .. }))
            .count();
        let completes = events
            .iter()
            .filter(|e| matches!(e.kind, TelemetryKind::RequestComplete { .. }))
            .count();
        assert_eq!(starts, 2);
        assert_eq!(completes, 2);
    }

    #[tokio::test]
    async fn duplicate_request_ids_produce_independent_completions() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, writer) = build(&dir, "[]", Arc::new(MockProvider::new("ok")));

        for _ in 0..2 {
            let mut req = request("gpt-4.1-nano", "same id twice");
            req.request_id = Some(RequestId::new("r-dup"));
            let resp = orch.invoke(&principal(), req).await.unwrap();
            assert!(resp.success);
        }

        let events = writer.read_events().await.unwrap();
        let completes = events
            .iter()
            .filter(|e| {
                matches!(&e.kind, TelemetryKind::RequestComplete { request_id, .. }
                    if request_id.as_str() == "r-dup")
            })
            .count();
        assert_eq!(completes, 2);
    }

    #[tokio::test]
    async fn interaction_stream_records_pipeline_stages() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, writer) = build(&dir, "[]", Arc::new(MockProvider::new("ok")));

        let mut req = request("gpt-4.1-nano", "hello");
        req.request_id = Some(RequestId::new("r-stages"));
        orch.invoke(&principal(), req).await.unwrap();

        let stages: Vec<Stage> = writer
            .read_interactions()
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.request_id.as_str() == "r-stages")
            .map(|s| s.stage)
            .collect();
        assert_eq!(
            stages,
            vec![
                Stage::Auth,
                Stage::Policy,
                Stage::GuardIn,
                Stage::ProviderCall,
                Stage::GuardOut
            ]
        );
    }
}
