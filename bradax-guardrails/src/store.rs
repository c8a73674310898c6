use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::info;

use bradax_core::guardrail::GuardrailSpec;

use crate::error::GuardrailError;
use crate::rule::RuleSet;

/// Loads and serves the guardrail rule set from `data/guardrails.json`.
///
/// The file is read once at startup; startup fails if any rule is invalid.
/// [`reload`](Self::reload) re-reads and re-validates the whole file, then
/// swaps the snapshot pointer atomically: evaluations observe either the
/// old set fully or the new one fully, never a mix.
pub struct RuleStore {
    path: PathBuf,
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    /// Load the rule file, failing fast on any invalid rule.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, GuardrailError> {
        let path = path.into();
        let rules = read_and_compile(&path)?;
        info!(count = rules.len(), path = %path.display(), "guardrail rules loaded");
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(rules)),
        })
    }

    /// The current immutable snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read().expect("rule snapshot lock poisoned"))
    }

    /// Re-read and re-validate the rule file, swapping the snapshot only
    /// when the whole file is valid. Returns the new rule count.
    pub fn reload(&self) -> Result<usize, GuardrailError> {
        let rules = read_and_compile(&self.path)?;
        let count = rules.len();
        *self.current.write().expect("rule snapshot lock poisoned") = Arc::new(rules);
        info!(count, path = %self.path.display(), "guardrail rules reloaded");
        Ok(count)
    }
}

fn read_and_compile(path: &Path) -> Result<RuleSet, GuardrailError> {
    let bytes = std::fs::read(path).map_err(|e| GuardrailError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let specs: Vec<GuardrailSpec> = serde_json::from_slice(&bytes)?;
    RuleSet::compile(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_rules(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("guardrails.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn load_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(
            &dir,
            r#"[{"rule_id": "no_python", "severity": "high", "action": "block",
                 "patterns": {"src": "(?i)python|def |import "}}]"#,
        );
        let store = RuleStore::load(path).unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn load_rejects_invalid_regex() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(
            &dir,
            r#"[{"rule_id": "bad", "severity": "low", "action": "flag",
                 "patterns": {"p": "("}}]"#,
        );
        assert!(matches!(
            RuleStore::load(path),
            Err(GuardrailError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn load_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("guardrails.json");
        assert!(matches!(RuleStore::load(missing), Err(GuardrailError::Io { .. })));
    }

    #[test]
    fn reload_swaps_snapshot_and_keeps_old_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_rules(
            &dir,
            r#"[{"rule_id": "a", "severity": "low", "action": "flag", "keywords": ["x"]}]"#,
        );
        let store = RuleStore::load(path.clone()).unwrap();
        let before = store.snapshot();
        assert_eq!(before.len(), 1);

        std::fs::write(
            &path,
            r#"[{"rule_id": "a", "severity": "low", "action": "flag", "keywords": ["x"]},
                {"rule_id": "b", "severity": "high", "action": "block", "keywords": ["y"]}]"#,
        )
        .unwrap();
        assert_eq!(store.reload().unwrap(), 2);
        assert_eq!(store.snapshot().len(), 2);
        // The earlier snapshot is unchanged for anyone still holding it.
        assert_eq!(before.len(), 1);

        // A broken file leaves the current snapshot in place.
        std::fs::write(&path, "not json").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().len(), 2);
    }
}
