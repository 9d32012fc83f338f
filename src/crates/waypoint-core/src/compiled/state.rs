use super::execution::{decode_pending, stored_config};
use super::CompiledGraph;
use crate::error::Result;
use crate::interrupt::InterruptRequest;
use crate::runtime::RunConfig;
use crate::state::State;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tracing::info;
use waypoint_checkpoint::Checkpoint;

/// Inspectable view of one checkpoint of a thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSnapshot {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub state: State,
    /// Node that runs next; `None` once completed
    pub next: Option<String>,
    /// Outstanding interrupt requests
    pub interrupts: Vec<InterruptRequest>,
    pub step: u64,
    pub config: RunConfig,
    pub created_at: DateTime<Utc>,
}

impl ThreadSnapshot {
    fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self> {
        Ok(Self {
            interrupts: decode_pending(&checkpoint.cursor.pending)?,
            config: stored_config(&checkpoint.metadata)?,
            step: checkpoint.metadata.step,
            next: checkpoint.cursor.next,
            state: State::from_value(checkpoint.state)?,
            thread_id: checkpoint.thread_id,
            checkpoint_id: checkpoint.id,
            created_at: checkpoint.ts,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.next.is_none()
    }

    pub fn is_suspended(&self) -> bool {
        !self.interrupts.is_empty()
    }
}

impl CompiledGraph {
    /// Latest snapshot of a thread
    pub async fn get_state(&self, thread_id: &str) -> Result<Option<ThreadSnapshot>> {
        self.checkpointer
            .get_latest(thread_id)
            .await?
            .map(ThreadSnapshot::from_checkpoint)
            .transpose()
    }

    /// Snapshots of a thread, newest first
    pub async fn history(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<ThreadSnapshot>> {
        let checkpoints: Vec<Checkpoint> = self
            .checkpointer
            .list(thread_id, limit)
            .await?
            .try_collect()
            .await?;
        checkpoints
            .into_iter()
            .map(ThreadSnapshot::from_checkpoint)
            .collect()
    }

    /// Drop a thread: its checkpoints and any pending interrupts
    ///
    /// Waits for an in-progress step of the thread to finish first.
    pub async fn cancel(&self, thread_id: &str) -> Result<bool> {
        let guard = self.locks.acquire(thread_id).await;
        let existed = self.checkpointer.delete_thread(thread_id).await?;
        drop(guard);

        info!(thread_id, existed, "Thread cancelled");
        Ok(existed)
    }
}
