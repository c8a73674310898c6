use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use bradax_core::types::{ProjectId, RequestId};

use crate::aggregate::ProjectUsage;
use crate::error::TelemetryError;
use crate::event::{GuardrailEvent, InteractionStage, TelemetryEvent, TelemetryKind};

/// Default cap on the bounded interaction stream.
pub const DEFAULT_INTERACTIONS_CAP: usize = 5_000;

const TELEMETRY_FILE: &str = "telemetry.json";
const GUARDRAIL_FILE: &str = "guardrail_events.json";
const INTERACTIONS_FILE: &str = "interactions.json";
const RAW_RESPONSES_DIR: &str = "raw/responses";

/// Append-only persistence for the three telemetry streams plus the
/// raw-response store.
///
/// Each stream is a single JSON array regrown on every write. A per-stream
/// mutex serializes appends within the process; appends to distinct streams
/// never block each other. Every append is durable (temp file, fsync,
/// rename) before the call returns.
pub struct TelemetryWriter {
    data_dir: PathBuf,
    interactions_cap: usize,
    telemetry: Mutex<()>,
    guardrails: Mutex<()>,
    interactions: Mutex<()>,
}

impl TelemetryWriter {
    /// Open (or create) the stream files under `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, TelemetryError> {
        let writer = Self {
            data_dir: data_dir.into(),
            interactions_cap: DEFAULT_INTERACTIONS_CAP,
            telemetry: Mutex::new(()),
            guardrails: Mutex::new(()),
            interactions: Mutex::new(()),
        };
        writer.ensure_layout()?;
        Ok(writer)
    }

    /// Override the interaction-stream cap.
    #[must_use]
    pub fn with_interactions_cap(mut self, cap: usize) -> Self {
        self.interactions_cap = cap;
        self
    }

    /// Re-create the stream files if log rotation moved them away.
    pub fn reload(&self) -> Result<(), TelemetryError> {
        self.ensure_layout()
    }

    /// Append an event to the main telemetry stream.
    pub async fn record_event(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        let _guard = self.telemetry.lock().await;
        let path = self.data_dir.join(TELEMETRY_FILE);
        let mut entries = load_array(&path).await?;
        entries.push(serde_json::to_value(event)?);
        write_atomic(&path, &serde_json::to_vec_pretty(&entries)?).await?;
        debug!(event_id = %event.event_id, "telemetry event recorded");
        Ok(())
    }

    /// Append an event to the guardrail stream.
    pub async fn record_guardrail(&self, event: &GuardrailEvent) -> Result<(), TelemetryError> {
        let _guard = self.guardrails.lock().await;
        let path = self.data_dir.join(GUARDRAIL_FILE);
        let mut entries = load_array(&path).await?;
        entries.push(serde_json::to_value(event)?);
        write_atomic(&path, &serde_json::to_vec_pretty(&entries)?).await?;
        debug!(rule_id = %event.rule_id, "guardrail event recorded");
        Ok(())
    }

    /// Append a stage to the bounded interaction stream, trimming the oldest
    /// entries in the same pass when the cap is exceeded.
    pub async fn record_interaction(&self, stage: &InteractionStage) -> Result<(), TelemetryError> {
        let _guard = self.interactions.lock().await;
        let path = self.data_dir.join(INTERACTIONS_FILE);
        let mut entries = load_array(&path).await?;
        entries.push(serde_json::to_value(stage)?);
        if entries.len() > self.interactions_cap {
            let excess = entries.len() - self.interactions_cap;
            entries.drain(..excess);
        }
        write_atomic(&path, &serde_json::to_vec_pretty(&entries)?).await?;
        Ok(())
    }

    /// Persist a provider's raw response body, keyed by request id. Used for
    /// error and guardrail-blocked outcomes.
    pub async fn capture_raw_response(
        &self,
        request_id: &RequestId,
        body: &serde_json::Value,
    ) -> Result<(), TelemetryError> {
        let path = self
            .data_dir
            .join(RAW_RESPONSES_DIR)
            .join(format!("{request_id}.json"));
        write_atomic(&path, &serde_json::to_vec_pretty(body)?).await
    }

    /// Scan the main stream and aggregate usage for one project.
    pub async fn aggregate(&self, project_id: &ProjectId) -> Result<ProjectUsage, TelemetryError> {
        let events = self.read_events().await?;

        let mut usage = ProjectUsage::empty(project_id.clone());
        let mut duration_total: u64 = 0;
        let mut completes: u64 = 0;
        let mut models: Vec<String> = Vec::new();

        for event in events {
            if event.project_id() != Some(project_id) {
                continue;
            }
            match event.kind {
                TelemetryKind::RequestStart { .. } => usage.total_requests += 1,
                TelemetryKind::Error { .. } => usage.total_errors += 1,
                TelemetryKind::RequestComplete {
                    success,
                    duration_ms,
                    model_used,
                    usage: tokens,
                    guardrails_triggered,
                    ..
                } => {
                    completes += 1;
                    duration_total += duration_ms;
                    if guardrails_triggered {
                        usage.guardrails_triggered += 1;
                    }
                    if let Some(tokens) = tokens {
                        usage.total_tokens += u64::from(tokens.total_tokens);
                        usage.total_cost_usd += tokens.cost_usd.unwrap_or(0.0);
                    }
                    if success && !models.contains(&model_used) {
                        models.push(model_used);
                    }
                }
                TelemetryKind::Authentication { .. } => {}
            }
        }

        if completes > 0 {
            usage.avg_duration_ms = duration_total as f64 / completes as f64;
        }
        if usage.total_requests > 0 {
            usage.error_rate = usage.total_errors as f64 / usage.total_requests as f64;
        }
        models.sort_unstable();
        usage.models_used = models;
        Ok(usage)
    }

    /// Read the full main stream. Entries that do not parse as telemetry
    /// events are skipped.
    pub async fn read_events(&self) -> Result<Vec<TelemetryEvent>, TelemetryError> {
        let entries = load_array(&self.data_dir.join(TELEMETRY_FILE)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Read the full guardrail stream.
    pub async fn read_guardrail_events(&self) -> Result<Vec<GuardrailEvent>, TelemetryError> {
        let entries = load_array(&self.data_dir.join(GUARDRAIL_FILE)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Read the full interaction stream.
    pub async fn read_interactions(&self) -> Result<Vec<InteractionStage>, TelemetryError> {
        let entries = load_array(&self.data_dir.join(INTERACTIONS_FILE)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    /// Path of the raw capture for a request, if one was written.
    #[must_use]
    pub fn raw_response_path(&self, request_id: &RequestId) -> PathBuf {
        self.data_dir
            .join(RAW_RESPONSES_DIR)
            .join(format!("{request_id}.json"))
    }

    fn ensure_layout(&self) -> Result<(), TelemetryError> {
        let raw_dir = self.data_dir.join(RAW_RESPONSES_DIR);
        std::fs::create_dir_all(&raw_dir).map_err(|e| TelemetryError::io(&raw_dir, e))?;
        for name in [TELEMETRY_FILE, GUARDRAIL_FILE, INTERACTIONS_FILE] {
            let path = self.data_dir.join(name);
            if !path.exists() {
                std::fs::write(&path, b"[]").map_err(|e| TelemetryError::io(&path, e))?;
            }
        }
        Ok(())
    }
}

/// Read a JSON array file, treating a missing or empty file as empty.
async fn load_array(path: &Path) -> Result<Vec<serde_json::Value>, TelemetryError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TelemetryError::io(path, e)),
    };
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write to a sibling temp file, fsync, then rename over the target so
/// readers always observe a complete array.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), TelemetryError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TelemetryError::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| TelemetryError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| TelemetryError::io(&tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| TelemetryError::io(&tmp, e))?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| TelemetryError::io(path, e))?;
    Ok(())
}
