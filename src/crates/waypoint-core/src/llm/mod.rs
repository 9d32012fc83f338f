//! Provider-agnostic language model contract
//!
//! Nodes talk to models through [`ChatModel`]. The engine treats a model as
//! an opaque, fallible function; callers wrap invocations in
//! [`invoke_with_retry`](crate::retry::invoke_with_retry) and define a
//! fallback for when it yields nothing.

pub mod request;
pub mod tools;
pub mod traits;

pub use request::{ChatRequest, ChatResponse, OutputSchema, ToolChoice};
pub use tools::ToolDefinition;
pub use traits::{ChatModel, ModelError};
