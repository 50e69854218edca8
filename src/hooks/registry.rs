//! Hook registry and dispatcher.
//!
//! Manages handler registration, priority ordering, and
//! first-success-wins dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use super::types::{HookHandler, HookName, HookOutcome, Registration};

/// Registry of hook handlers, keyed by hook name.
///
/// Dispatch iterates a stable snapshot of the handler list taken at
/// call start, so a handler that triggers new registrations
/// mid-dispatch (e.g. by loading another plugin) cannot invalidate the
/// iteration.
pub struct HookRegistry {
    hooks: Arc<RwLock<HashMap<HookName, Vec<Registration>>>>,
    /// Which hooks each plugin has registered on, for bulk removal.
    by_plugin: Arc<RwLock<HashMap<String, HashSet<HookName>>>>,
    /// Plugins whose handlers are skipped at dispatch time even while
    /// still registered.
    disabled: Arc<RwLock<HashSet<String>>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            hooks: Arc::new(RwLock::new(HashMap::new())),
            by_plugin: Arc::new(RwLock::new(HashMap::new())),
            disabled: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Register a handler for a hook by wire name.
    ///
    /// An unknown hook name is a warn-and-skip, never an error: a
    /// malformed plugin must not abort its own load by registering a
    /// hook that does not exist.
    pub async fn register(
        &self,
        hook_name: &str,
        handler: Arc<dyn HookHandler>,
        priority: i32,
        plugin_id: &str,
    ) {
        let hook: HookName = match hook_name.parse() {
            Ok(h) => h,
            Err(_) => {
                tracing::warn!(
                    plugin_id,
                    hook_name,
                    "ignoring registration for unknown hook"
                );
                return;
            }
        };

        let mut hooks = self.hooks.write().await;
        let entry = hooks.entry(hook).or_default();
        entry.push(Registration {
            hook,
            handler,
            priority,
            plugin_id: plugin_id.to_string(),
        });
        // Stable sort: equal priorities keep registration order.
        entry.sort_by(|a, b| b.priority.cmp(&a.priority));
        drop(hooks);

        self.by_plugin
            .write()
            .await
            .entry(plugin_id.to_string())
            .or_default()
            .insert(hook);
    }

    /// Dispatch a hook: invoke handlers in descending-priority order
    /// until the first one returns `Handled`.
    ///
    /// Handlers of disabled plugins are skipped. A handler error is
    /// logged and does not stop iteration — one broken plugin cannot
    /// break the pipeline. Returns the winning payload, or `None` when
    /// no handler handled the hook.
    pub async fn dispatch(
        &self,
        hook: HookName,
        args: &serde_json::Value,
    ) -> Option<serde_json::Value> {
        let snapshot: Vec<Registration> = self
            .hooks
            .read()
            .await
            .get(&hook)
            .cloned()
            .unwrap_or_default();
        let disabled = self.disabled.read().await.clone();

        for reg in &snapshot {
            if disabled.contains(&reg.plugin_id) {
                continue;
            }
            match reg.handler.invoke(args).await {
                Ok(HookOutcome::Handled(payload)) => {
                    tracing::debug!(
                        hook = %hook,
                        plugin_id = reg.plugin_id,
                        "hook handled"
                    );
                    return Some(payload);
                }
                Ok(HookOutcome::Skip) => {}
                Err(e) => {
                    tracing::warn!(
                        hook = %hook,
                        plugin_id = reg.plugin_id,
                        error = %e,
                        "hook handler failed, continuing"
                    );
                }
            }
        }

        None
    }

    /// Remove every registration owned by a plugin, across all hooks.
    ///
    /// Idempotent: a second call, or a call for a plugin that never
    /// registered anything, is a no-op. Only the hooks the plugin
    /// actually registered on are visited.
    pub async fn unregister_all(&self, plugin_id: &str) {
        let Some(registered_on) = self.by_plugin.write().await.remove(plugin_id) else {
            return;
        };

        let mut hooks = self.hooks.write().await;
        for hook in registered_on {
            if let Some(entry) = hooks.get_mut(&hook) {
                entry.retain(|r| r.plugin_id != plugin_id);
            }
        }
    }

    /// Mark a plugin enabled or disabled. Disabled plugins keep their
    /// registrations but are skipped at dispatch time.
    pub async fn set_plugin_enabled(&self, plugin_id: &str, enabled: bool) {
        let mut disabled = self.disabled.write().await;
        if enabled {
            disabled.remove(plugin_id);
        } else {
            disabled.insert(plugin_id.to_string());
        }
    }

    /// Number of registrations currently owned by a plugin.
    pub async fn registration_count(&self, plugin_id: &str) -> usize {
        self.hooks
            .read()
            .await
            .values()
            .flatten()
            .filter(|r| r.plugin_id == plugin_id)
            .count()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
