//! # waypoint-checkpoint - Thread snapshots for resumable workflows
//!
//! Trait-based checkpoint persistence for the waypoint workflow engine. The
//! engine saves a [`Checkpoint`] after every node, on every suspension and on
//! completion, so a thread can be resumed after a human decision or after the
//! process restarts.
//!
//! ## Core Concepts
//!
//! - [`CheckpointSaver`] - storage backend trait (`put`, `get_latest`, `get`,
//!   `list`, `delete_thread`, plus derived `save` / `load`)
//! - [`Checkpoint`] - serialized state plus [`Cursor`] and metadata
//! - [`Cursor`] - next node and pending interrupt requests
//!
//! ## Backends
//!
//! - [`InMemoryCheckpointSaver`] - for tests and single-process use
//! - [`FileCheckpointSaver`] - JSON-lines files, one per thread
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waypoint_checkpoint::{CheckpointSaver, Cursor, FileCheckpointSaver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = FileCheckpointSaver::open("./.waypoint/checkpoints").await?;
//!     saver.save("thread-1", serde_json::json!({"messages": []}), Cursor::at("triage_router")).await?;
//!
//!     if let Some((state, cursor)) = saver.load("thread-1").await? {
//!         println!("resume at {:?} with {}", cursor.next, state);
//!     }
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use checkpoint::{
    Checkpoint, CheckpointId, CheckpointMetadata, CheckpointSource, Cursor, CHECKPOINT_VERSION,
};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointSaver;
pub use memory::InMemoryCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
