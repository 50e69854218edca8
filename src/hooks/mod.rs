//! Plugin hook system.
//!
//! Named extension points with a documented argument/return contract:
//! - `parse_document` — extract text from an uploaded file
//! - `web_search` — run a web search for a query
//! - `pre_embedding` / `post_retrieval` — RAG pipeline transforms
//! - `before_send` / `after_receive` — chat request/response rework
//! - `transform_input` / `transform_output` — message text rewriting
//! - `toolbar_button`, `custom_action`, `custom_settings`,
//!   `file_preview` — UI-only extension points
//!
//! Dispatch invokes handlers for one hook in priority order until one
//! returns `Handled` (first-success-wins, not a merge).

mod registry;
mod types;

pub use registry::HookRegistry;
pub use types::{FnHandler, HookHandler, HookName, HookOutcome, Registration};
