//! clawchat — extensible AI chat client runtime.
//!
//! The two load-bearing pieces are the plugin extensibility runtime
//! (hook registry and dispatch, plugin lifecycle, credential-proxy
//! indirection, plugin-scoped storage) and the streaming response
//! assembler that incrementally parses newline-delimited JSON frames
//! from the backend into mutable message state under cooperative
//! cancellation.
//!
//! Document parsers, search providers, renderers, and settings UIs
//! live in plugins, behind the hook contract in [`hooks`]. Plugin
//! code is treated as unaudited: it reaches the network only through
//! the credential-proxying [`gateway`] and persists data only through
//! its own storage namespace.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hooks;
pub mod logging;
pub mod plugins;
pub mod runtime;
pub mod stream;

pub use chat::{ChatClient, ChatRequest, Message, SendCompletion, SendOutput};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use hooks::{HookName, HookOutcome, HookRegistry};
pub use runtime::ChatRuntime;
