//! Plugin descriptors and manifest validation.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PluginError;
use crate::hooks::HookName;

/// Persisted metadata and state for one installed plugin.
///
/// This is the JSON shape stored by the descriptor store and shipped
/// in plugin manifests:
/// `{id, version, enabled, main, hooks[], dependencies{}, settings[],
/// settings_values{}, proxy[]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin identifier (safe slug, used as storage namespace).
    pub id: String,
    /// Version string.
    pub version: String,
    /// Whether the plugin is enabled. Manifests default to enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Entry-point file, relative to the plugin's directory on the
    /// backend.
    #[serde(default = "default_main")]
    pub main: String,
    /// Wire names of the hooks this plugin declares.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Declared dependency modules: name → fetch URL.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Settings schema rendered by the settings UI.
    #[serde(default)]
    pub settings: Vec<SettingField>,
    /// Current values for the settings schema.
    #[serde(default)]
    pub settings_values: serde_json::Map<String, serde_json::Value>,
    /// Proxy services whose credentials live server-side.
    #[serde(default)]
    pub proxy: Vec<ProxyService>,
}

fn default_enabled() -> bool {
    true
}

fn default_main() -> String {
    "main.js".to_string()
}

/// One field in a plugin's settings schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingField {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub field_type: SettingFieldType,
    #[serde(default)]
    pub default: serde_json::Value,
    /// Choices for `select` fields.
    #[serde(default)]
    pub options: Vec<String>,
}

/// Kind of settings field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettingFieldType {
    #[default]
    Text,
    Number,
    Boolean,
    Select,
}

/// A proxy service declared by a plugin.
///
/// The credential for a service is stored server-side; plugin code
/// references the service only by id. `allowed_urls` narrows which
/// URLs the plugin may route through this service (prefix patterns
/// with an optional trailing `*`); empty means unrestricted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyService {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub allowed_urls: Vec<String>,
}

/// Validate a descriptor parsed from a manifest.
///
/// Rejects empty ids/versions, ids that are not safe slugs (the id
/// doubles as a storage namespace), hook names outside the contract,
/// and dependency URLs that do not parse.
pub fn validate_descriptor(descriptor: &PluginDescriptor) -> Result<(), PluginError> {
    if descriptor.id.is_empty() {
        return Err(PluginError::InvalidManifest {
            reason: "id is empty".to_string(),
        });
    }
    if !is_safe_slug(&descriptor.id) {
        return Err(PluginError::InvalidManifest {
            reason: format!("id \"{}\" is not a safe slug", descriptor.id),
        });
    }
    if descriptor.version.is_empty() {
        return Err(PluginError::InvalidManifest {
            reason: "version is empty".to_string(),
        });
    }
    if descriptor.main.is_empty() || is_path_escape(&descriptor.main) {
        return Err(PluginError::InvalidManifest {
            reason: format!("main \"{}\" is empty or attempts path traversal", descriptor.main),
        });
    }
    for hook in &descriptor.hooks {
        if HookName::from_str(hook).is_err() {
            return Err(PluginError::InvalidManifest {
                reason: format!("unknown hook: \"{hook}\""),
            });
        }
    }
    for (name, dep_url) in &descriptor.dependencies {
        if name.is_empty() {
            return Err(PluginError::InvalidManifest {
                reason: "dependency name is empty".to_string(),
            });
        }
        if url::Url::parse(dep_url).is_err() {
            return Err(PluginError::InvalidManifest {
                reason: format!("dependency \"{name}\" has invalid URL: \"{dep_url}\""),
            });
        }
    }
    for service in &descriptor.proxy {
        if service.id.is_empty() {
            return Err(PluginError::InvalidManifest {
                reason: "proxy service id is empty".to_string(),
            });
        }
    }
    Ok(())
}

/// A slug may contain only alphanumerics, `-`, `_` and `.`, and must
/// not start with a dot (the id names files and directories).
fn is_safe_slug(s: &str) -> bool {
    !s.starts_with('.')
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Returns true if a relative path attempts to escape its root via
/// `..`, absolute components, or other shenanigans.
fn is_path_escape(relative: &str) -> bool {
    use std::path::{Component, Path};

    let path = Path::new(relative);
    if path.is_absolute() {
        return true;
    }
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return true,
            _ => {}
        }
    }
    false
}
