//! File-backed checkpoint storage
//!
//! Each thread gets one JSON-lines file under the saver's directory; every
//! checkpoint is one appended line. File names are the hex-encoded thread id,
//! so arbitrary ids map to distinct, filesystem-safe names.
//!
//! A torn final line (process killed mid-append) is skipped with a warning;
//! the previous checkpoint stays authoritative.

use crate::{
    checkpoint::{Checkpoint, CheckpointId},
    error::{CheckpointError, Result},
    traits::{CheckpointSaver, CheckpointStream},
};
use async_trait::async_trait;
use futures::stream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Checkpoint saver persisting to a directory of JSON-lines files
#[derive(Debug, Clone)]
pub struct FileCheckpointSaver {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileCheckpointSaver {
    /// Open (and create if needed) a checkpoint directory
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn thread_path(&self, thread_id: &str) -> PathBuf {
        let name: String = thread_id
            .as_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        self.root.join(format!("{name}.jsonl"))
    }

    async fn read_thread(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let path = self.thread_path(thread_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut checkpoints = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<Checkpoint>(line) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(err) if index + 1 == lines.len() => {
                    warn!(thread_id, path = %path.display(), error = %err, "Skipping torn checkpoint line");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(checkpoints)
    }

    /// Cut a torn final line so the next append starts on a fresh line
    async fn trim_torn_tail(&self, path: &Path) -> Result<()> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let keep = bytes
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |index| index + 1);
        if keep < bytes.len() {
            warn!(path = %path.display(), dropped = bytes.len() - keep, "Truncating torn checkpoint line");
            let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
            file.set_len(keep as u64).await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointSaver for FileCheckpointSaver {
    async fn put(&self, mut checkpoint: Checkpoint) -> Result<CheckpointId> {
        if checkpoint.thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let _guard = self.write_lock.lock().await;

        if checkpoint.parent_id.is_none() {
            checkpoint.parent_id = self
                .read_thread(&checkpoint.thread_id)
                .await?
                .last()
                .map(|last| last.id.clone());
        }

        let mut line = serde_json::to_string(&checkpoint)?;
        line.push('\n');

        let path = self.thread_path(&checkpoint.thread_id);
        self.trim_torn_tail(&path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(thread_id = %checkpoint.thread_id, checkpoint_id = %checkpoint.id, "Checkpoint appended");
        Ok(checkpoint.id)
    }

    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.read_thread(thread_id).await?.pop())
    }

    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .read_thread(thread_id)
            .await?
            .into_iter()
            .find(|checkpoint| checkpoint.id == checkpoint_id))
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        let results: Vec<Result<Checkpoint>> = self
            .read_thread(thread_id)
            .await?
            .into_iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(Ok)
            .collect();
        Ok(Box::pin(stream::iter(results)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.thread_path(thread_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
