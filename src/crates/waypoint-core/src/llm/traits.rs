use super::request::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use thiserror::Error;

/// Model failures, split by whether retrying can help
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transient model failure: {0}")]
    Transient(String),

    #[error("Model failure: {0}")]
    Permanent(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::RateLimited(_) | ModelError::Transient(_))
    }
}

/// Core trait for chat-based language models
///
/// Implementations convert [`ChatRequest`]s to their provider's wire format
/// and classify failures into [`ModelError`] variants so callers can decide
/// whether to retry.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// Identifier used in logs
    fn name(&self) -> &str {
        "chat-model"
    }
}
