use std::sync::Arc;
use std::time::Duration;

use bradax_guardrails::{GuardrailEngine, RuleStore};
use bradax_provider::ProviderAdapter;
use bradax_store::{ModelCatalog, ProjectStore};
use bradax_telemetry::TelemetryWriter;

use crate::error::GatewayError;
use crate::metrics::DispatchMetrics;
use crate::orchestrator::Orchestrator;

/// Default deadline for the upstream provider call.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(180);

/// Fluent builder for an [`Orchestrator`].
///
/// The project store, model catalog, rule store, provider adapter, and
/// telemetry writer are required; the provider timeout defaults to 180 s.
pub struct OrchestratorBuilder {
    projects: Option<Arc<ProjectStore>>,
    catalog: Option<Arc<ModelCatalog>>,
    rules: Option<Arc<RuleStore>>,
    provider: Option<Arc<dyn ProviderAdapter>>,
    writer: Option<Arc<TelemetryWriter>>,
    provider_timeout: Duration,
}

impl OrchestratorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            projects: None,
            catalog: None,
            rules: None,
            provider: None,
            writer: None,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    #[must_use]
    pub fn projects(mut self, projects: Arc<ProjectStore>) -> Self {
        self.projects = Some(projects);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<ModelCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: Arc<RuleStore>) -> Self {
        self.rules = Some(rules);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ProviderAdapter>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn writer(mut self, writer: Arc<TelemetryWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    #[must_use]
    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    /// Consume the builder and produce a configured [`Orchestrator`].
    pub fn build(self) -> Result<Orchestrator, GatewayError> {
        let projects = self
            .projects
            .ok_or_else(|| GatewayError::Configuration("project store is required".into()))?;
        let catalog = self
            .catalog
            .ok_or_else(|| GatewayError::Configuration("model catalog is required".into()))?;
        let rules = self
            .rules
            .ok_or_else(|| GatewayError::Configuration("rule store is required".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| GatewayError::Configuration("provider adapter is required".into()))?;
        let writer = self
            .writer
            .ok_or_else(|| GatewayError::Configuration("telemetry writer is required".into()))?;

        let engine = GuardrailEngine::new(Arc::clone(&writer));

        Ok(Orchestrator {
            projects,
            catalog,
            rules,
            engine,
            provider,
            writer,
            provider_timeout: self.provider_timeout,
            metrics: Arc::new(DispatchMetrics::default()),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
