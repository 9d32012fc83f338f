//! Layered configuration
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.waypoint/waypoint.toml
//! 3. Project-level config: ./.waypoint/waypoint.toml
//! 4. An explicit `--config` file
//!
//! Later layers override earlier ones key by key.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use waypoint_core::{RetryPolicy, DEFAULT_RECURSION_LIMIT};

/// Configuration directory name
pub const CONFIG_DIR: &str = ".waypoint";

/// Configuration file name
pub const CONFIG_FILE: &str = "waypoint.toml";

/// Full CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WaypointConfig {
    pub llm: LlmSection,
    pub retry: RetrySection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
    pub agent: AgentSection,
}

/// Model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// OpenAI-compatible API base URL (supports `${VAR}`)
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Temperature for requests that do not pin one
    pub temperature: Option<f32>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: waypoint_llm::DEFAULT_BASE_URL.to_string(),
            model: waypoint_llm::DEFAULT_MODEL.to_string(),
            api_key_env: waypoint_llm::DEFAULT_API_KEY_ENV.to_string(),
            timeout_secs: 60,
            temperature: None,
        }
    }
}

/// Backoff for transient model failures, intervals in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub initial_interval: f64,
    pub backoff_factor: f64,
    pub max_interval: f64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_interval: policy.initial_interval,
            backoff_factor: policy.backoff_factor,
            max_interval: policy.max_interval,
            jitter: policy.jitter,
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_initial_interval(self.initial_interval)
            .with_backoff_factor(self.backoff_factor)
            .with_max_interval(self.max_interval)
            .with_jitter(self.jitter)
    }
}

/// Where threads and memories live between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory of per-thread checkpoint files
    pub checkpoint_dir: PathBuf,
    /// JSON snapshot of the memory store
    pub store_file: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from(CONFIG_DIR).join("checkpoints"),
            store_file: PathBuf::from(CONFIG_DIR).join("store.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Replaces the email assistant's background description
    pub background: Option<String>,
    pub recursion_limit: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            background: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl WaypointConfig {
    /// Model client settings, reading the API key from the environment
    ///
    /// A missing key yields an empty one, which local servers accept.
    pub fn llm_config(&self) -> waypoint_llm::LlmConfig {
        let api_key = std::env::var(&self.llm.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            debug!(env = %self.llm.api_key_env, "No API key set");
        }
        let mut config = waypoint_llm::LlmConfig::new(api_key, &self.llm.base_url, &self.llm.model)
            .with_timeout(Duration::from_secs(self.llm.timeout_secs));
        if let Some(temperature) = self.llm.temperature {
            config = config.with_temperature(temperature);
        }
        config
    }

    /// Resolve `${VAR}` references in string settings
    pub fn resolve_env_vars(&mut self) {
        self.llm.base_url = expand_env_var(&self.llm.base_url);
        self.llm.model = expand_env_var(&self.llm.model);
    }
}

fn expand_env_var(value: &str) -> String {
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(name) => std::env::var(name).unwrap_or_else(|_| value.to_string()),
        None => value.to_string(),
    }
}

/// User-level config path (~/.waypoint/waypoint.toml)
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Project-level config path (./.waypoint/waypoint.toml)
pub fn project_config_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join(CONFIG_FILE)
}

/// Loads and merges the configuration layers
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    layers: Vec<PathBuf>,
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader over the user and project files
    pub fn new() -> Self {
        let layers = user_config_path()
            .into_iter()
            .chain(std::iter::once(project_config_path()))
            .collect();
        Self {
            layers,
            explicit: None,
        }
    }

    /// Loader over exactly the given optional layers
    pub fn with_layers(layers: Vec<PathBuf>) -> Self {
        Self {
            layers,
            explicit: None,
        }
    }

    /// Add a final layer that must exist
    pub fn with_explicit(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<WaypointConfig> {
        let mut merged = toml::Table::new();

        for path in &self.layers {
            if !path.exists() {
                debug!(path = %path.display(), "Config layer not found");
                continue;
            }
            merge_tables(&mut merged, read_table(path)?);
            debug!(path = %path.display(), "Loaded config layer");
        }
        if let Some(path) = &self.explicit {
            merge_tables(&mut merged, read_table(path)?);
            debug!(path = %path.display(), "Loaded explicit config");
        }

        let mut config: WaypointConfig = toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")?;
        config.resolve_env_vars();
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}

/// Overlay `overlay` onto `base`; nested tables merge, other values replace
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested)
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Contents written by `waypoint init`
pub const DEFAULT_CONFIG: &str = r#"# Waypoint configuration
#
# User-level settings live in ~/.waypoint/waypoint.toml; a project can
# override any key in ./.waypoint/waypoint.toml.

[llm]
# Any OpenAI-compatible endpoint (OpenAI, OpenRouter, LM Studio, Ollama)
base_url = "https://api.openai.com/v1"
model = "gpt-4o-mini"
# Environment variable holding the API key
api_key_env = "OPENAI_API_KEY"
timeout_secs = 60

[retry]
max_attempts = 3
initial_interval = 0.5
backoff_factor = 2.0
max_interval = 128.0
jitter = true

[storage]
checkpoint_dir = ".waypoint/checkpoints"
store_file = ".waypoint/store.json"

[logging]
# Overridden by RUST_LOG
level = "warn"

[agent]
recursion_limit = 25
"#;
