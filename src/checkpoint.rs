use crate::error::CheckpointError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Last indexed revision per crawled repository path, persisted as JSON
///
/// Keys are `<repository url>|<path>`; the next crawl of a key starts right
/// after its recorded revision.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RevisionCheckpoint {
    pub revisions: BTreeMap<String, u64>,
}

impl RevisionCheckpoint {
    pub fn default_path() -> PathBuf {
        crate::paths::PlatformPaths::default_checkpoint_path()
    }

    pub fn key(url: &str, path: &str) -> String {
        format!("{}|{}", url, path)
    }

    /// Load from disk; a missing file is an empty checkpoint
    pub fn load(path: &Path) -> Result<Self, CheckpointError> {
        if !path.exists() {
            tracing::debug!("Checkpoint file not found, starting from scratch");
            return Ok(Self::default());
        }

        let load_failed = |reason: String| CheckpointError::LoadFailed {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let checkpoint: RevisionCheckpoint =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;

        tracing::debug!(
            "Loaded checkpoint with {} crawled paths",
            checkpoint.revisions.len()
        );
        Ok(checkpoint)
    }

    pub fn save(&self, path: &Path) -> Result<(), CheckpointError> {
        let save_failed = |reason: String| CheckpointError::SaveFailed {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;

        tracing::debug!("Saved checkpoint to {:?}", path);
        Ok(())
    }

    pub fn last_revision(&self, key: &str) -> Option<u64> {
        self.revisions.get(key).copied()
    }

    /// First revision the next crawl of `key` should read
    pub fn next_start(&self, key: &str, configured_start: u64) -> u64 {
        match self.last_revision(key) {
            Some(last) => configured_start.max(last + 1),
            None => configured_start,
        }
    }

    /// Record `revision` as indexed; never moves a key backwards
    ///
    /// Returns whether the stored value changed.
    pub fn record(&mut self, key: &str, revision: u64) -> bool {
        match self.revisions.get(key) {
            Some(&last) if last >= revision => false,
            _ => {
                self.revisions.insert(key.to_string(), revision);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.revisions.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.revisions.clear();
    }
}
