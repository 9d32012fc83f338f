//! # waypoint-llm
//!
//! Chat model client for OpenAI-compatible endpoints, implementing
//! [`waypoint_core::ChatModel`].
//!
//! Provider failures are classified for the engine's retry policy: HTTP 429
//! becomes [`ModelError::RateLimited`](waypoint_core::ModelError), server
//! errors, timeouts and refused connections become transient, and
//! everything else is permanent.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use waypoint_llm::{LlmConfig, OpenAiClient};
//!
//! let config = LlmConfig::from_env("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4o")?;
//! let runtime = runtime.with_model(Arc::new(OpenAiClient::new(config)?));
//! ```

pub mod config;
pub mod error;
pub mod openai;

pub use config::{LlmConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{LlmError, Result};
pub use openai::OpenAiClient;
