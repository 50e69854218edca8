//! Persistence for installed plugin descriptors.
//!
//! Each descriptor is one JSON file, `{dir}/{id}.json`. Invalid or
//! unreadable files are logged and skipped on scan — they never fail
//! the whole listing.

use std::path::{Path, PathBuf};

use crate::error::PluginError;
use crate::plugins::descriptor::PluginDescriptor;

/// File-backed store of installed plugin descriptors.
pub struct DescriptorStore {
    dir: PathBuf,
}

impl DescriptorStore {
    /// Create a store rooted at `dir`. The directory is created on
    /// first write, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Load all stored descriptors. Corrupt entries are skipped.
    pub fn load_all(&self) -> Vec<PluginDescriptor> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };

        let mut descriptors = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_one(&path) {
                Ok(d) => descriptors.push(d),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable descriptor");
                }
            }
        }
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        descriptors
    }

    fn read_one(path: &Path) -> Result<PluginDescriptor, String> {
        let data = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&data).map_err(|e| e.to_string())
    }

    /// Load one descriptor by id.
    pub fn get(&self, id: &str) -> Option<PluginDescriptor> {
        Self::read_one(&self.path_for(id)).ok()
    }

    /// Persist a descriptor, overwriting any previous version.
    pub fn save(&self, descriptor: &PluginDescriptor) -> Result<(), PluginError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PluginError::Store(format!("create dir: {e}")))?;
        let json = serde_json::to_string_pretty(descriptor)
            .map_err(|e| PluginError::Store(format!("serialize: {e}")))?;
        std::fs::write(self.path_for(&descriptor.id), json)
            .map_err(|e| PluginError::Store(format!("write: {e}")))
    }

    /// Delete a descriptor. Deleting a missing descriptor is a no-op.
    pub fn delete(&self, id: &str) -> Result<(), PluginError> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PluginError::Store(format!("delete: {e}"))),
        }
    }
}
