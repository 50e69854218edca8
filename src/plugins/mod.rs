//! Plugin runtime: descriptors, persistence, loading, lifecycle, and
//! plugin-scoped storage.
//!
//! Plugins are installable from a URL or an uploaded archive and are
//! treated as unaudited code. The runtime hands each module a
//! capability-scoped context (hook registration, its own storage
//! namespace, proxied network access via declared services) rather
//! than ambient access.

pub mod descriptor;
pub mod lifecycle;
pub mod loader;
pub mod storage;
pub mod store;

pub use descriptor::{
    PluginDescriptor, ProxyService, SettingField, SettingFieldType, validate_descriptor,
};
pub use lifecycle::LifecycleManager;
pub use loader::{
    HttpModuleFetcher, LoadMarker, ModuleFetcher, ModuleHost, ModuleSources, PluginContext,
    PluginLoader, PluginModule,
};
pub use storage::{MAX_NAMESPACE_BYTES, PluginStorage, ScopedStorage};
pub use store::DescriptorStore;
