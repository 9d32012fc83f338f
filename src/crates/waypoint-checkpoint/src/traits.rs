//! Storage trait for checkpoint backends
//!
//! [`CheckpointSaver`] is the seam between the workflow engine and whatever
//! persists thread snapshots. Backends only need the primitive operations
//! (`put`, `get_latest`, `get`, `list`, `delete_thread`); the `save` / `load`
//! pair the engine relies on is derived from them.
//!
//! # Contract
//!
//! - Checkpoints of one thread are appended, never rewritten. `get_latest`
//!   returns the most recently appended one.
//! - `put` fills in `parent_id` with the previous latest checkpoint when the
//!   caller left it empty.
//! - `load` after `save` returns exactly the saved state and cursor.
//! - Missing threads are `Ok(None)`, not errors.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use waypoint_checkpoint::{Checkpoint, CheckpointId, CheckpointSaver, CheckpointStream, Result};
//!
//! struct SqliteSaver { /* pool */ }
//!
//! #[async_trait]
//! impl CheckpointSaver for SqliteSaver {
//!     async fn put(&self, checkpoint: Checkpoint) -> Result<CheckpointId> { todo!() }
//!     async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> { todo!() }
//!     async fn get(&self, thread_id: &str, id: &str) -> Result<Option<Checkpoint>> { todo!() }
//!     async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> { todo!() }
//!     async fn delete_thread(&self, thread_id: &str) -> Result<bool> { todo!() }
//! }
//! ```

use crate::{
    checkpoint::{Checkpoint, CheckpointId, Cursor},
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use serde_json::Value;
use std::pin::Pin;

/// Async stream of checkpoints, newest first
pub type CheckpointStream = Pin<Box<dyn Stream<Item = Result<Checkpoint>> + Send + 'static>>;

/// Core trait for checkpoint storage backends
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Append a checkpoint to its thread and return its id
    async fn put(&self, checkpoint: Checkpoint) -> Result<CheckpointId>;

    /// Most recent checkpoint of a thread
    async fn get_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// A specific checkpoint of a thread
    async fn get(&self, thread_id: &str, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// Checkpoint history of a thread, newest first
    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream>;

    /// Remove every checkpoint of a thread. Returns whether anything existed.
    async fn delete_thread(&self, thread_id: &str) -> Result<bool>;

    /// Persist `(state, cursor)` as the thread's newest checkpoint
    async fn save(&self, thread_id: &str, state: Value, cursor: Cursor) -> Result<CheckpointId> {
        self.put(Checkpoint::new(thread_id, state, cursor)).await
    }

    /// Latest `(state, cursor)` of a thread
    async fn load(&self, thread_id: &str) -> Result<Option<(Value, Cursor)>> {
        Ok(self
            .get_latest(thread_id)
            .await?
            .map(|checkpoint| (checkpoint.state, checkpoint.cursor)))
    }
}
