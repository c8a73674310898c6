use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::info;

use bradax_core::project::ProjectRecord;
use bradax_core::types::ProjectId;

use crate::error::StoreError;

type Snapshot = Arc<HashMap<ProjectId, ProjectRecord>>;

struct Cached {
    snapshot: Snapshot,
    modified: Option<SystemTime>,
}

/// Read-mostly store over `data/projects.json`.
///
/// Records are validated at load; the in-memory snapshot is invalidated
/// when the backing file's mtime changes, so out-of-band operator edits
/// become visible without a restart. The core never writes project records.
pub struct ProjectStore {
    path: PathBuf,
    cache: RwLock<Cached>,
}

impl ProjectStore {
    /// Load and validate the project file, failing fast on any violation.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (snapshot, modified) = read_validated(&path)?;
        info!(count = snapshot.len(), path = %path.display(), "project store loaded");
        Ok(Self {
            path,
            cache: RwLock::new(Cached { snapshot, modified }),
        })
    }

    /// The current consistent snapshot, reloading if the file changed.
    pub fn snapshot(&self) -> Result<Snapshot, StoreError> {
        let on_disk = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok();

        {
            let cached = self.cache.read().expect("project cache lock poisoned");
            if cached.modified == on_disk {
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        let (snapshot, modified) = read_validated(&self.path)?;
        let mut cached = self.cache.write().expect("project cache lock poisoned");
        cached.snapshot = Arc::clone(&snapshot);
        cached.modified = modified;
        info!(count = snapshot.len(), "project store refreshed from disk");
        Ok(snapshot)
    }

    /// Look up a project by id.
    pub fn get(&self, project_id: &ProjectId) -> Result<ProjectRecord, StoreError> {
        self.snapshot()?
            .get(project_id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownProject(project_id.clone()))
    }

    /// All records, sorted by project id.
    pub fn list(&self) -> Result<Vec<ProjectRecord>, StoreError> {
        let snapshot = self.snapshot()?;
        let mut records: Vec<ProjectRecord> = snapshot.values().cloned().collect();
        records.sort_by(|a, b| a.project_id.as_str().cmp(b.project_id.as_str()));
        Ok(records)
    }
}

fn read_validated(path: &Path) -> Result<(Snapshot, Option<SystemTime>), StoreError> {
    let bytes = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

    let records: Vec<ProjectRecord> = serde_json::from_slice(&bytes).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    validate(&records)?;

    let map = records
        .into_iter()
        .map(|r| (r.project_id.clone(), r))
        .collect();
    Ok((Arc::new(map), modified))
}

fn validate(records: &[ProjectRecord]) -> Result<(), StoreError> {
    let mut seen = std::collections::HashSet::new();
    for record in records {
        if !seen.insert(&record.project_id) {
            return Err(StoreError::Integrity(format!(
                "duplicate project id '{}'",
                record.project_id
            )));
        }
        if record.is_active() && record.allowed_models.is_empty() {
            return Err(StoreError::Integrity(format!(
                "active project '{}' has an empty model allow-list",
                record.project_id
            )));
        }
        if record.budget_remaining < 0.0 {
            return Err(StoreError::Integrity(format!(
                "project '{}' has a negative budget",
                record.project_id
            )));
        }
    }
    Ok(())
}
