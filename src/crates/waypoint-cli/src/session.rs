//! Storage and runtime shared by every command
//!
//! Threads persist through a [`FileCheckpointSaver`]. The memory store is
//! in-memory while a command runs and snapshotted to a JSON file afterwards.

use crate::config::WaypointConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use waypoint_agents::content::ContentManager;
use waypoint_agents::email::{AssistantProfile, EmailAssistant, MailBackend};
use waypoint_core::{
    CheckpointSaver, CompiledGraph, FileCheckpointSaver, InMemoryStore, Item, Runtime,
};
use waypoint_llm::OpenAiClient;

/// Read a store snapshot; a missing file is an empty store
pub async fn load_store(path: &Path) -> Result<InMemoryStore> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No store snapshot yet");
            return Ok(InMemoryStore::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read store {}", path.display()))
        }
    };
    let items: Vec<Item> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse store {}", path.display()))?;
    debug!(path = %path.display(), items = items.len(), "Loaded store snapshot");
    Ok(InMemoryStore::from_items(items))
}

/// Write every item of `store` to `path`
pub async fn save_store(store: &InMemoryStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let items = store.snapshot().await;
    let content = serde_json::to_string_pretty(&items)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write store {}", path.display()))?;
    debug!(path = %path.display(), items = items.len(), "Saved store snapshot");
    Ok(())
}

pub struct Session {
    config: WaypointConfig,
    store: Arc<InMemoryStore>,
    store_file: PathBuf,
    checkpointer: Arc<FileCheckpointSaver>,
}

impl Session {
    pub async fn open(config: WaypointConfig) -> Result<Self> {
        let checkpointer = FileCheckpointSaver::open(&config.storage.checkpoint_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to open checkpoint directory {}",
                    config.storage.checkpoint_dir.display()
                )
            })?;
        let store_file = config.storage.store_file.clone();
        let store = load_store(&store_file).await?;
        info!(checkpoints = %config.storage.checkpoint_dir.display(), "Session opened");

        Ok(Self {
            config,
            store: Arc::new(store),
            store_file,
            checkpointer: Arc::new(checkpointer),
        })
    }

    pub fn config(&self) -> &WaypointConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    fn checkpointer(&self) -> Arc<dyn CheckpointSaver> {
        self.checkpointer.clone()
    }

    /// Runtime without a model, for commands that only read threads
    pub fn offline_runtime(&self) -> Runtime {
        Runtime::new(self.store.clone()).with_retry_policy(self.config.retry.to_policy())
    }

    /// Runtime bound to the configured model endpoint
    pub fn runtime(&self) -> Result<Runtime> {
        let client = OpenAiClient::new(self.config.llm_config())?;
        Ok(self.offline_runtime().with_model(Arc::new(client)))
    }

    pub fn email_graph(&self, runtime: Runtime, backend: Arc<dyn MailBackend>) -> Result<CompiledGraph> {
        let mut profile = AssistantProfile::default();
        if let Some(background) = &self.config.agent.background {
            profile.background = background.clone();
        }
        let graph = EmailAssistant::new(backend)
            .with_profile(profile)
            .compile(runtime, self.checkpointer())?;
        Ok(graph.with_recursion_limit(self.config.agent.recursion_limit))
    }

    pub fn content_graph(&self, runtime: Runtime) -> Result<CompiledGraph> {
        let graph = ContentManager::new().compile(runtime, self.checkpointer())?;
        Ok(graph.with_recursion_limit(self.config.agent.recursion_limit))
    }

    /// Persist the memory store
    pub async fn save(&self) -> Result<()> {
        save_store(&self.store, &self.store_file).await
    }
}
