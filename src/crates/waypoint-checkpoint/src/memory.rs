//! In-memory checkpoint storage
//!
//! [`InMemoryCheckpointSaver`] keeps every checkpoint in an
//! `Arc<RwLock<HashMap<thread_id, Vec<Checkpoint>>>>`. Appends are O(1),
//! latest lookups are O(1), lookups by id scan the thread's history.
//! Clones share the same storage. Data is lost when the process exits; use
//! [`FileCheckpointSaver`](crate::file::FileCheckpointSaver) when threads
//! must survive restarts.

use crate::{
    checkpoint::{Checkpoint, CheckpointId},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type CheckpointStorage = Arc<RwLock<HashMap<String, Vec<Checkpoint>>>>;

/// In-memory checkpoint saver
///
/// ```rust
/// use waypoint_checkpoint::{CheckpointSaver, Cursor, InMemoryCheckpointSaver};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let saver = InMemoryCheckpointSaver::new();
/// saver.save("thread-1", serde_json::json!({"messages": []}), Cursor::at("triage")).await?;
/// let (_, cursor) = saver.load("thread-1").await?.expect("saved");
/// assert_eq!(cursor.next.as_deref(), Some("triage"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointSaver {
    storage: CheckpointStorage,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads with at least one checkpoint
    pub async fn thread_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total number of checkpoints across all threads
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }

    /// Drop every checkpoint
    pub async fn clear(&self) {
        self.storage.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn put(&self, mut checkpoint: Checkpoint) -> Result<CheckpointId> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let mut storage = self.storage.write().await;
        let entries = storage.entry(checkpoint.thread_id.clone()).or_default();

        if checkpoint.parent_id.is_none() {
            checkpoint.parent_id = entries.last().map(|last| last.id.clone());
        }
        let id = checkpoint.id.clone();
        entries.push(checkpoint);

        Ok(id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(thread_id)
            .and_then(|entries| entries.last())
            .cloned())
    }

    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(thread_id).and_then(|entries| {
            entries
                .iter()
                .find(|entry| entry.id == checkpoint_id)
                .cloned()
        }))
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let storage = self.storage.read().await;
        let results: Vec<Result<Checkpoint>> = storage
            .get(thread_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .take(limit.unwrap_or(usize::MAX))
                    .cloned()
                    .map(Ok)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let mut storage = self.storage.write().await;
        Ok(storage.remove(thread_id).is_some())
    }
}
