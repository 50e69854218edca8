//! Plugin loading: dependency fetching, module instantiation, and the
//! capability-scoped context handed to plugin code.
//!
//! Loads are strictly serialized through a mutex. The
//! currently-loading marker can only be occupied while a load holds
//! that mutex, so the marker is never ambiguous — this replaces the
//! hazard of an unguarded shared slot with an explicit load queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::error::PluginError;
use crate::gateway::{GatewayResponse, ProxyGatewayClient, ProxyRequest, validate_service_url};
use crate::hooks::{HookHandler, HookRegistry};
use crate::plugins::descriptor::PluginDescriptor;
use crate::plugins::storage::{PluginStorage, ScopedStorage};

/// Slot naming the plugin whose module is currently executing its
/// init. Storage calls made during init without an explicit plugin id
/// resolve against this.
#[derive(Clone, Default)]
pub struct LoadMarker(Arc<std::sync::RwLock<Option<String>>>);

impl LoadMarker {
    /// The id of the plugin currently loading, if any.
    pub fn current(&self) -> Option<String> {
        self.0.read().ok().and_then(|slot| slot.clone())
    }

    fn set(&self, id: &str) {
        if let Ok(mut slot) = self.0.write() {
            *slot = Some(id.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.0.write() {
            *slot = None;
        }
    }

    #[cfg(test)]
    pub(crate) fn test_set(&self, id: &str) {
        self.set(id);
    }

    #[cfg(test)]
    pub(crate) fn test_clear(&self) {
        self.clear();
    }
}

/// Fetches module sources over the network. Abstracted so tests can
/// stub fetching without a server.
#[async_trait::async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

/// Fetcher backed by `reqwest`.
pub struct HttpModuleFetcher {
    client: reqwest::Client,
}

impl HttpModuleFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpModuleFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ModuleFetcher for HttpModuleFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("fetch of {url} returned status {status}");
        }
        Ok(response.text().await?)
    }
}

/// Source text gathered for one plugin: the main module plus the
/// dependency modules that fetched successfully.
#[derive(Debug, Clone)]
pub struct ModuleSources {
    pub main: String,
    pub dependencies: HashMap<String, String>,
}

/// An instantiated plugin module.
///
/// `init` runs once per load with the plugin's capability-scoped
/// context; registrations it performs are attributed to the loading
/// plugin. Loading resolves when `init` returns — any background work
/// the module starts is its own business and is not awaited.
#[async_trait::async_trait]
pub trait PluginModule: Send + Sync {
    async fn init(&self, ctx: &PluginContext) -> anyhow::Result<()>;
}

/// Turns fetched sources into an executable module.
///
/// The runtime ships no script engine; hosts are external
/// collaborators (an embedded interpreter, a WASM runtime, or
/// native-built plugins) that only see the narrow `PluginContext`
/// surface.
pub trait ModuleHost: Send + Sync {
    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sources: &ModuleSources,
    ) -> anyhow::Result<Box<dyn PluginModule>>;
}

/// The capability surface a plugin module can reach: hook
/// registration, its own storage namespace, and proxied network
/// access limited to its declared services.
pub struct PluginContext {
    descriptor: PluginDescriptor,
    registry: Arc<HookRegistry>,
    storage: Arc<PluginStorage>,
    gateway: Arc<ProxyGatewayClient>,
}

impl PluginContext {
    /// Id of the plugin this context belongs to.
    pub fn plugin_id(&self) -> &str {
        &self.descriptor.id
    }

    /// Current settings values for this plugin.
    pub fn settings(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.descriptor.settings_values
    }

    /// Register a hook handler, attributed to this plugin.
    pub async fn register_hook(
        &self,
        hook_name: &str,
        handler: Arc<dyn HookHandler>,
        priority: i32,
    ) {
        self.registry
            .register(hook_name, handler, priority, &self.descriptor.id)
            .await;
    }

    /// Storage pinned to this plugin's namespace.
    pub fn storage(&self) -> ScopedStorage {
        ScopedStorage::new(self.storage.clone(), &self.descriptor.id)
    }

    /// Proxied request through a service this plugin declared.
    ///
    /// Undeclared services and URLs outside the service's allowed
    /// patterns fail closed with `success: false`.
    pub async fn proxy_request(&self, request: ProxyRequest) -> GatewayResponse {
        let Some(service) = self
            .descriptor
            .proxy
            .iter()
            .find(|s| s.id == request.service_id)
        else {
            return GatewayResponse::fail(format!(
                "service \"{}\" is not declared by plugin \"{}\"",
                request.service_id, self.descriptor.id
            ));
        };
        if let Err(reason) = validate_service_url(&request.url, &service.allowed_urls) {
            return GatewayResponse::fail(reason);
        }
        self.gateway.request(request).await
    }

    /// Proxied multipart upload through a declared service.
    pub async fn proxy_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        service_id: &str,
        url: &str,
        extra_fields: &serde_json::Map<String, serde_json::Value>,
        file_field_name: &str,
    ) -> GatewayResponse {
        let Some(service) = self.descriptor.proxy.iter().find(|s| s.id == service_id) else {
            return GatewayResponse::fail(format!(
                "service \"{service_id}\" is not declared by plugin \"{}\"",
                self.descriptor.id
            ));
        };
        if let Err(reason) = validate_service_url(url, &service.allowed_urls) {
            return GatewayResponse::fail(reason);
        }
        self.gateway
            .upload(file_name, bytes, service_id, url, extra_fields, file_field_name)
            .await
    }
}

/// Loads plugins: fetches dependencies and the main module, then runs
/// the module's init with registrations attributed to it.
pub struct PluginLoader {
    fetcher: Arc<dyn ModuleFetcher>,
    host: Arc<dyn ModuleHost>,
    registry: Arc<HookRegistry>,
    storage: Arc<PluginStorage>,
    gateway: Arc<ProxyGatewayClient>,
    /// Base URL the backend serves plugin files from.
    plugin_base_url: String,
    /// Fetched dependency sources, keyed by dependency name.
    dep_cache: Arc<RwLock<HashMap<String, String>>>,
    marker: LoadMarker,
    /// Serializes loads; the marker is only written while held.
    load_lock: Mutex<()>,
}

impl PluginLoader {
    pub fn new(
        fetcher: Arc<dyn ModuleFetcher>,
        host: Arc<dyn ModuleHost>,
        registry: Arc<HookRegistry>,
        storage: Arc<PluginStorage>,
        gateway: Arc<ProxyGatewayClient>,
        plugin_base_url: impl Into<String>,
    ) -> Self {
        let marker = LoadMarker::default();
        storage.attach_load_marker(marker.clone());
        Self {
            fetcher,
            host,
            registry,
            storage,
            gateway,
            plugin_base_url: plugin_base_url.into(),
            dep_cache: Arc::new(RwLock::new(HashMap::new())),
            marker,
            load_lock: Mutex::new(()),
        }
    }

    /// The currently-loading marker (shared with plugin storage).
    pub fn marker(&self) -> LoadMarker {
        self.marker.clone()
    }

    /// Load a plugin.
    ///
    /// Resolves once the module's init has returned. Dependency fetch
    /// failures are logged and skipped — the plugin loads with reduced
    /// capability. Main module fetch or init failure is an error the
    /// caller logs; the plugin stays installed but non-functional.
    pub async fn load(&self, descriptor: &PluginDescriptor) -> Result<(), PluginError> {
        let _serialized = self.load_lock.lock().await;
        self.marker.set(&descriptor.id);
        let result = self.load_marked(descriptor).await;
        self.marker.clear();
        result
    }

    async fn load_marked(&self, descriptor: &PluginDescriptor) -> Result<(), PluginError> {
        for (name, url) in &descriptor.dependencies {
            if self.dep_cache.read().await.contains_key(name) {
                continue;
            }
            match self.fetcher.fetch(url).await {
                Ok(source) => {
                    self.dep_cache
                        .write()
                        .await
                        .insert(name.clone(), source);
                }
                Err(e) => {
                    tracing::warn!(
                        plugin_id = descriptor.id,
                        dependency = name,
                        error = %e,
                        "dependency fetch failed, loading with reduced capability"
                    );
                }
            }
        }

        let main_url = format!(
            "{}/{}/{}",
            self.plugin_base_url, descriptor.id, descriptor.main
        );
        let main = self
            .fetcher
            .fetch(&main_url)
            .await
            .map_err(|e| PluginError::ModuleFetch {
                plugin_id: descriptor.id.clone(),
                reason: e.to_string(),
            })?;

        let cache = self.dep_cache.read().await;
        let dependencies: HashMap<String, String> = descriptor
            .dependencies
            .keys()
            .filter_map(|name| cache.get(name).map(|src| (name.clone(), src.clone())))
            .collect();
        drop(cache);

        let sources = ModuleSources { main, dependencies };
        let module = self
            .host
            .instantiate(descriptor, &sources)
            .map_err(|e| PluginError::Init {
                plugin_id: descriptor.id.clone(),
                reason: e.to_string(),
            })?;

        let ctx = PluginContext {
            descriptor: descriptor.clone(),
            registry: self.registry.clone(),
            storage: self.storage.clone(),
            gateway: self.gateway.clone(),
        };
        module.init(&ctx).await.map_err(|e| PluginError::Init {
            plugin_id: descriptor.id.clone(),
            reason: e.to_string(),
        })
    }

    /// Whether a dependency is already cached under its name.
    pub async fn is_dependency_cached(&self, name: &str) -> bool {
        self.dep_cache.read().await.contains_key(name)
    }
}
