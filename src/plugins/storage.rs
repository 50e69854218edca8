//! Namespaced, size-capped key-value storage for plugins.
//!
//! Each plugin gets one JSON namespace file under the data directory.
//! Writes are atomic (temp file + rename) and fail closed: an
//! over-quota `set` returns `false` and leaves prior data untouched.

use std::path::{Path, PathBuf};

use crate::plugins::loader::LoadMarker;

/// Per-plugin serialized-size ceiling: 1 MiB.
pub const MAX_NAMESPACE_BYTES: usize = 1024 * 1024;

/// File-backed plugin storage.
///
/// Plugin identity resolves from the explicit argument when supplied,
/// else from the currently-loading marker (callers running during a
/// plugin's init may omit the id). Callers invoked after load
/// completes must pass the id explicitly, or the call is a warn-and-
/// no-op.
pub struct PluginStorage {
    dir: PathBuf,
    marker: std::sync::RwLock<Option<LoadMarker>>,
}

impl PluginStorage {
    /// Create storage rooted at `dir`. The directory is created on
    /// first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            marker: std::sync::RwLock::new(None),
        }
    }

    /// Wire in the loader's currently-loading marker for the implicit
    /// identity fallback.
    pub fn attach_load_marker(&self, marker: LoadMarker) {
        if let Ok(mut slot) = self.marker.write() {
            *slot = Some(marker);
        }
    }

    fn resolve_id(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(id) = explicit {
            return Some(id.to_string());
        }
        let fallback = self
            .marker
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(|m| m.current()));
        if fallback.is_none() {
            tracing::warn!(
                "plugin storage call without plugin id outside a plugin load; ignoring"
            );
        }
        fallback
    }

    fn namespace_path(&self, plugin_id: &str) -> PathBuf {
        self.dir.join(format!("{plugin_id}.json"))
    }

    fn read_namespace(&self, plugin_id: &str) -> serde_json::Map<String, serde_json::Value> {
        let path = self.namespace_path(plugin_id);
        let Ok(data) = std::fs::read_to_string(&path) else {
            return serde_json::Map::new();
        };
        match serde_json::from_str(&data) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                tracing::warn!(plugin_id, "corrupt storage namespace, starting empty");
                serde_json::Map::new()
            }
        }
    }

    fn write_namespace(
        &self,
        plugin_id: &str,
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        let serialized = match serde_json::to_string(&serde_json::Value::Object(map.clone())) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(plugin_id, error = %e, "storage serialization failed");
                return false;
            }
        };
        if serialized.len() > MAX_NAMESPACE_BYTES {
            tracing::warn!(
                plugin_id,
                bytes = serialized.len(),
                limit = MAX_NAMESPACE_BYTES,
                "storage write exceeds quota, rejecting"
            );
            return false;
        }
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!(plugin_id, error = %e, "storage dir create failed");
            return false;
        }
        // Atomic replace so a failed write cannot corrupt prior data.
        let path = self.namespace_path(plugin_id);
        let tmp = self.dir.join(format!(".{plugin_id}.json.tmp"));
        if let Err(e) = std::fs::write(&tmp, &serialized) {
            tracing::warn!(plugin_id, error = %e, "storage temp write failed");
            return false;
        }
        if let Err(e) = std::fs::rename(&tmp, &path) {
            tracing::warn!(plugin_id, error = %e, "storage rename failed");
            let _ = std::fs::remove_file(&tmp);
            return false;
        }
        true
    }

    /// Read one key from a plugin's namespace.
    pub fn get(&self, key: &str, plugin_id: Option<&str>) -> Option<serde_json::Value> {
        let id = self.resolve_id(plugin_id)?;
        self.read_namespace(&id).get(key).cloned()
    }

    /// Read one key, falling back to a default when absent.
    pub fn get_or(
        &self,
        key: &str,
        default: serde_json::Value,
        plugin_id: Option<&str>,
    ) -> serde_json::Value {
        self.get(key, plugin_id).unwrap_or(default)
    }

    /// Write one key. Returns `false` (leaving prior data untouched)
    /// when identity cannot be resolved or the namespace would exceed
    /// its quota.
    pub fn set(&self, key: &str, value: serde_json::Value, plugin_id: Option<&str>) -> bool {
        let Some(id) = self.resolve_id(plugin_id) else {
            return false;
        };
        let mut map = self.read_namespace(&id);
        map.insert(key.to_string(), value);
        self.write_namespace(&id, &map)
    }

    /// Remove one key. Returns `true` when the key existed.
    pub fn remove(&self, key: &str, plugin_id: Option<&str>) -> bool {
        let Some(id) = self.resolve_id(plugin_id) else {
            return false;
        };
        let mut map = self.read_namespace(&id);
        if map.remove(key).is_none() {
            return false;
        }
        self.write_namespace(&id, &map)
    }

    /// Remove a plugin's whole namespace.
    pub fn clear(&self, plugin_id: Option<&str>) -> bool {
        let Some(id) = self.resolve_id(plugin_id) else {
            return false;
        };
        match std::fs::remove_file(self.namespace_path(&id)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!(plugin_id = id, error = %e, "storage clear failed");
                false
            }
        }
    }

    /// All keys and values in a plugin's namespace.
    pub fn get_all(&self, plugin_id: Option<&str>) -> serde_json::Map<String, serde_json::Value> {
        match self.resolve_id(plugin_id) {
            Some(id) => self.read_namespace(&id),
            None => serde_json::Map::new(),
        }
    }
}

/// Storage handle pinned to one plugin's namespace — the capability
/// handed to plugin code, which never names another plugin's id.
pub struct ScopedStorage {
    storage: std::sync::Arc<PluginStorage>,
    plugin_id: String,
}

impl ScopedStorage {
    pub(crate) fn new(storage: std::sync::Arc<PluginStorage>, plugin_id: &str) -> Self {
        Self {
            storage,
            plugin_id: plugin_id.to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.storage.get(key, Some(&self.plugin_id))
    }

    pub fn get_or(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
        self.storage.get_or(key, default, Some(&self.plugin_id))
    }

    pub fn set(&self, key: &str, value: serde_json::Value) -> bool {
        self.storage.set(key, value, Some(&self.plugin_id))
    }

    pub fn remove(&self, key: &str) -> bool {
        self.storage.remove(key, Some(&self.plugin_id))
    }

    pub fn clear(&self) -> bool {
        self.storage.clear(Some(&self.plugin_id))
    }

    pub fn get_all(&self) -> serde_json::Map<String, serde_json::Value> {
        self.storage.get_all(Some(&self.plugin_id))
    }
}
