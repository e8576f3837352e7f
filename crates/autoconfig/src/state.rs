//! Persistence of the configured-asset map.
//!
//! The state lives in a single JSON file, `{state_dir}/state`. Writes go to
//! a temp file in the same directory followed by an atomic rename.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::asset::AssetInfo;
use crate::error::AutoconfigError;

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !dir.exists() {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(path = %dir.display(), error = %e, "failed to create state directory");
            }
        }
        Self { dir }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join("state")
    }

    /// Load the persisted inventory; missing or empty file is an empty map.
    pub fn load(&self) -> Result<HashMap<String, AssetInfo>, AutoconfigError> {
        let path = self.state_path();
        if !path.exists() {
            debug!(path = %path.display(), "no state file yet");
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Persist the inventory atomically.
    pub fn save(&self, inventory: &HashMap<String, AssetInfo>) -> Result<(), AutoconfigError> {
        let tmp = self.dir.join(".state.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(inventory)?)?;
        fs::rename(&tmp, self.state_path())?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
