use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use bradax_core::types::ModelId;

use crate::error::StoreError;

/// One catalog entry from `data/llm_models.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ModelEntry {
    pub model_id: ModelId,
    pub name: String,
    pub max_tokens: u32,
    /// Price per 1,000 tokens in USD.
    pub cost_per_1k_usd: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The model catalog, read once at startup and read-only during the run.
pub struct ModelCatalog {
    path: PathBuf,
    entries: Vec<ModelEntry>,
}

impl ModelCatalog {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = read_entries(&path)?;
        info!(count = entries.len(), path = %path.display(), "model catalog loaded");
        Ok(Self { path, entries })
    }

    /// Look up an enabled catalog entry.
    #[must_use]
    pub fn get(&self, model_id: &ModelId) -> Option<&ModelEntry> {
        self.entries
            .iter()
            .find(|e| e.enabled && &e.model_id == model_id)
    }

    /// All enabled entries.
    #[must_use]
    pub fn entries(&self) -> Vec<&ModelEntry> {
        self.entries.iter().filter(|e| e.enabled).collect()
    }

    /// Cost estimate in USD for a token count, when the model is known.
    #[must_use]
    pub fn estimate_cost(&self, model_id: &ModelId, total_tokens: u32) -> Option<f64> {
        self.get(model_id)
            .map(|e| f64::from(total_tokens) / 1000.0 * e.cost_per_1k_usd)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_entries(path: &Path) -> Result<Vec<ModelEntry>, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}
