use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use crate::error::ApiError;
use crate::models::ModelEntry;

// tracks which model directory is considered loaded; the runtime
// loads weights on its own, this is bookkeeping only
pub struct ModelRegistry {
    base_path: PathBuf,
    loaded: RwLock<Option<String>>
}

impl ModelRegistry {

    pub fn new(base_path: impl Into<PathBuf>) -> Self {

        ModelRegistry {
            base_path: base_path.into(),
            loaded: RwLock::new(None),
        }

    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn list_models(&self) -> BTreeMap<String, ModelEntry> {

        let mut out = BTreeMap::new();

        let entries = match std::fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.base_path.display(), error = %e, "cannot read model directory");
                return out;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            out.insert(
                entry.file_name().to_string_lossy().into_owned(),
                ModelEntry {
                    path: path.to_string_lossy().into_owned(),
                    exists: path.exists(),
                },
            );
        }

        out

    }

    pub fn load_model(&self, model_id: &str) -> Result<(), ApiError> {

        let path = self.resolve(model_id)?;

        if !path.exists() {
            return Err(ApiError::ModelNotFound(path.display().to_string()));
        }

        info!(model = model_id, path = %path.display(), "model marked as loaded");
        *self.loaded.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(model_id.to_string());
        Ok(())

    }

    pub fn loaded(&self) -> Option<String> {

        self.loaded
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()

    }

    // ids are single directory entries, never paths that climb out of base_path
    fn resolve(&self, model_id: &str) -> Result<PathBuf, ApiError> {

        let mut components = Path::new(model_id).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.base_path.join(model_id)),
            _ => Err(ApiError::ModelNotFound(model_id.to_string())),
        }

    }

}
