//! Connection settings for an OpenAI-compatible provider.

use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
/// Variable the CLI reads the API key from unless configured otherwise
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and how to reach a chat completions endpoint.
///
/// `base_url` is the API root, e.g. `https://openrouter.ai/api/v1` or a
/// local `http://localhost:1234/v1`; `/chat/completions` is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Sent as a Bearer token; left out when empty (local servers)
    #[serde(default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    #[serde(default = "timeout_default")]
    pub timeout: Duration,
    /// `OpenAI-Organization` header
    #[serde(default)]
    pub organization: Option<String>,
    /// Used for requests that leave the temperature unset
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn timeout_default() -> Duration {
    DEFAULT_TIMEOUT
}

impl LlmConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            organization: None,
            temperature: None,
        }
    }

    /// Like [`new`](Self::new), taking the key from `env_var`
    pub fn from_env(
        env_var: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        match std::env::var(env_var) {
            Ok(key) => Ok(Self::new(key, base_url, model)),
            Err(_) => Err(LlmError::ApiKeyNotFound(format!("${env_var} is not set"))),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}
