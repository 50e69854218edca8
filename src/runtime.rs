//! Wiring of the client runtime.
//!
//! Builds the component graph: backend API, hook registry, plugin
//! storage, proxy gateway, loader, lifecycle manager, and the chat
//! client. The module host — the piece that actually evaluates plugin
//! code — is supplied by the embedder.

use std::sync::Arc;

use crate::api::BackendApi;
use crate::chat::ChatClient;
use crate::config::ClientConfig;
use crate::gateway::ProxyGatewayClient;
use crate::hooks::HookRegistry;
use crate::plugins::{
    DescriptorStore, HttpModuleFetcher, LifecycleManager, ModuleFetcher, ModuleHost,
    PluginLoader, PluginStorage,
};

/// The assembled chat client runtime.
pub struct ChatRuntime {
    pub config: ClientConfig,
    pub api: Arc<BackendApi>,
    pub registry: Arc<HookRegistry>,
    pub storage: Arc<PluginStorage>,
    pub gateway: Arc<ProxyGatewayClient>,
    pub plugins: Arc<LifecycleManager>,
    pub client: ChatClient,
}

impl ChatRuntime {
    /// Wire up the runtime with the default HTTP module fetcher.
    pub fn new(config: ClientConfig, host: Arc<dyn ModuleHost>) -> Self {
        Self::with_fetcher(config, host, Arc::new(HttpModuleFetcher::new()))
    }

    /// Wire up the runtime with a custom module fetcher.
    pub fn with_fetcher(
        config: ClientConfig,
        host: Arc<dyn ModuleHost>,
        fetcher: Arc<dyn ModuleFetcher>,
    ) -> Self {
        let api = Arc::new(BackendApi::new(&config));
        let registry = Arc::new(HookRegistry::new());
        let storage = Arc::new(PluginStorage::new(config.plugin_data_dir()));
        let gateway = Arc::new(ProxyGatewayClient::new(config.base_url.clone()));
        let loader = Arc::new(PluginLoader::new(
            fetcher,
            host,
            registry.clone(),
            storage.clone(),
            gateway.clone(),
            config.plugin_base_url(),
        ));
        let plugins = Arc::new(LifecycleManager::new(
            DescriptorStore::new(config.plugins_dir()),
            registry.clone(),
            loader,
            storage.clone(),
        ));
        let client = ChatClient::new(api.clone(), registry.clone());

        Self {
            config,
            api,
            registry,
            storage,
            gateway,
            plugins,
            client,
        }
    }

    /// Bring up persisted plugins. Broken plugins log and stay
    /// installed; core chat is never blocked.
    pub async fn start(&self) {
        self.plugins.start().await;
    }
}
