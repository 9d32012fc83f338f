//! Provider failures and their mapping onto [`ModelError`].

use thiserror::Error;
use waypoint_core::ModelError;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport failure before a status was received
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Could not encode or decode JSON: {0}")]
    SerializationError(String),

    /// 401 or 403
    #[error("Provider rejected the credentials: {0}")]
    AuthenticationError(String),

    #[error("No API key: {0}")]
    ApiKeyNotFound(String),

    /// 5xx
    #[error("Provider failed: {0}")]
    ServiceUnavailable(String),

    /// 429
    #[error("Rate limited: {0}")]
    RateLimitExceeded(String),

    /// Any other 4xx
    #[error("Provider refused the request: {0}")]
    InvalidRequest(String),

    /// A 2xx body that cannot be turned into a chat response
    #[error("Unusable response: {0}")]
    InvalidResponse(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Bad client configuration: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Whether waiting and trying again can help
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::HttpError(err) => err.is_timeout() || err.is_connect(),
            LlmError::ServiceUnavailable(_) | LlmError::Timeout(_) | LlmError::RateLimitExceeded(_) => true,
            _ => false,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            LlmError::ApiKeyNotFound(_) | LlmError::AuthenticationError(_)
        )
    }

    /// Classify an unsuccessful HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => LlmError::AuthenticationError(body),
            429 => LlmError::RateLimitExceeded(body),
            500..=599 => LlmError::ServiceUnavailable(format!("status {status}: {body}")),
            _ => LlmError::InvalidRequest(format!("status {status}: {body}")),
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(source: serde_json::Error) -> Self {
        Self::SerializationError(source.to_string())
    }
}

impl From<LlmError> for ModelError {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::RateLimitExceeded(message) => ModelError::RateLimited(message),
            LlmError::ServiceUnavailable(message) | LlmError::Timeout(message) => {
                ModelError::Transient(message)
            }
            LlmError::HttpError(err) if err.is_timeout() || err.is_connect() => {
                ModelError::Transient(err.to_string())
            }
            LlmError::InvalidResponse(message) | LlmError::SerializationError(message) => {
                ModelError::InvalidResponse(message)
            }
            other => ModelError::Permanent(other.to_string()),
        }
    }
}
