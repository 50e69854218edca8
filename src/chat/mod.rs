//! Chat messages and the send pipeline.

pub mod message;
pub mod pipeline;

pub use message::{Message, Role, StoredMessage};
pub use pipeline::{ChatClient, ChatRequest, SendCompletion, SendOutput, StreamTransport};
