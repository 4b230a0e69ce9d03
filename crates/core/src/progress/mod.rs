use std::path::{Path, PathBuf};

use crate::{judgement::JudgementTally, Result};

/// Per-level player progress files: `<dir>/<level id>.json`, one
/// [`JudgementTally`] each.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
}

impl ProgressStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, level_id: &str) -> PathBuf {
        self.dir.join(format!("{level_id}.json"))
    }

    /// Writes the record for `level_id`, replacing any previous one.
    pub fn save(&self, level_id: &str, tally: &JudgementTally) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(level_id);
        std::fs::write(&path, serde_json::to_string(tally)?)?;
        tracing::info!(level = level_id, path = %path.display(), "saved player progress");
        Ok(path)
    }

    /// Reads the record for `level_id`, `None` if the level was never
    /// cleared.
    pub fn load(&self, level_id: &str) -> Result<Option<JudgementTally>> {
        let path = self.path_for(level_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}
