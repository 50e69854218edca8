//! Hook types and data structures.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Named extension points plugins can register handlers for.
///
/// The serialized names are the wire names plugin manifests declare
/// (`"parse_document"`, `"before_send"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookName {
    /// Extract text content from an uploaded file.
    ParseDocument,
    /// Run a web search for a query.
    WebSearch,
    /// Transform text before it is embedded.
    PreEmbedding,
    /// Rework retrieval results before they reach the prompt.
    PostRetrieval,
    /// Amend the outgoing chat request body.
    BeforeSend,
    /// Rework the finished assistant message.
    AfterReceive,
    /// Rewrite the user's input message.
    TransformInput,
    /// Rewrite rendered output content.
    TransformOutput,
    /// UI-only: contribute a toolbar button.
    ToolbarButton,
    /// UI-only: contribute a custom action.
    CustomAction,
    /// UI-only: contribute a settings panel.
    CustomSettings,
    /// UI-only: contribute a file preview renderer.
    FilePreview,
}

impl HookName {
    /// All known hooks, in contract order.
    pub const ALL: [HookName; 12] = [
        Self::ParseDocument,
        Self::WebSearch,
        Self::PreEmbedding,
        Self::PostRetrieval,
        Self::BeforeSend,
        Self::AfterReceive,
        Self::TransformInput,
        Self::TransformOutput,
        Self::ToolbarButton,
        Self::CustomAction,
        Self::CustomSettings,
        Self::FilePreview,
    ];

    /// Whether this is a UI-only extension point with no data contract
    /// enforced by the runtime.
    pub fn is_ui_only(&self) -> bool {
        matches!(
            self,
            Self::ToolbarButton | Self::CustomAction | Self::CustomSettings | Self::FilePreview
        )
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ParseDocument => "parse_document",
            Self::WebSearch => "web_search",
            Self::PreEmbedding => "pre_embedding",
            Self::PostRetrieval => "post_retrieval",
            Self::BeforeSend => "before_send",
            Self::AfterReceive => "after_receive",
            Self::TransformInput => "transform_input",
            Self::TransformOutput => "transform_output",
            Self::ToolbarButton => "toolbar_button",
            Self::CustomAction => "custom_action",
            Self::CustomSettings => "custom_settings",
            Self::FilePreview => "file_preview",
        };
        write!(f, "{name}")
    }
}

impl FromStr for HookName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parse_document" => Ok(Self::ParseDocument),
            "web_search" => Ok(Self::WebSearch),
            "pre_embedding" => Ok(Self::PreEmbedding),
            "post_retrieval" => Ok(Self::PostRetrieval),
            "before_send" => Ok(Self::BeforeSend),
            "after_receive" => Ok(Self::AfterReceive),
            "transform_input" => Ok(Self::TransformInput),
            "transform_output" => Ok(Self::TransformOutput),
            "toolbar_button" => Ok(Self::ToolbarButton),
            "custom_action" => Ok(Self::CustomAction),
            "custom_settings" => Ok(Self::CustomSettings),
            "file_preview" => Ok(Self::FilePreview),
            _ => Err(format!("unknown hook name: '{s}'")),
        }
    }
}

/// Outcome of a single handler invocation.
///
/// Dispatch is first-success-wins: the first handler returning
/// `Handled` short-circuits the remaining handlers for that hook.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    /// This handler declines; dispatch continues with the next one.
    Skip,
    /// This handler produced the hook's result payload.
    Handled(serde_json::Value),
}

impl HookOutcome {
    /// The payload if this outcome is `Handled`.
    pub fn into_payload(self) -> Option<serde_json::Value> {
        match self {
            Self::Skip => None,
            Self::Handled(value) => Some(value),
        }
    }
}

/// A hook handler contributed by a plugin.
///
/// Handlers receive the hook's argument object and may suspend on I/O.
/// An `Err` is isolated by the dispatcher: logged, and iteration
/// continues with the next handler.
#[async_trait::async_trait]
pub trait HookHandler: Send + Sync {
    async fn invoke(&self, args: &serde_json::Value) -> anyhow::Result<HookOutcome>;
}

/// Handler wrapper for plain closures, so tests and simple plugins can
/// register functions without a named type.
pub struct FnHandler<F>(pub F);

#[async_trait::async_trait]
impl<F> HookHandler for FnHandler<F>
where
    F: Fn(&serde_json::Value) -> anyhow::Result<HookOutcome> + Send + Sync,
{
    async fn invoke(&self, args: &serde_json::Value) -> anyhow::Result<HookOutcome> {
        (self.0)(args)
    }
}

/// One registered handler.
///
/// The plugin id is a weak back-reference used only for bulk removal
/// and the disabled-plugin check; it confers no ownership over the
/// handler's behavior.
#[derive(Clone)]
pub struct Registration {
    pub hook: HookName,
    pub handler: Arc<dyn HookHandler>,
    pub priority: i32,
    pub plugin_id: String,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("hook", &self.hook)
            .field("priority", &self.priority)
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}
