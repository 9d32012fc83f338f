//! Checkpoint data structures
//!
//! A [`Checkpoint`] is a point-in-time snapshot of one thread: the merged
//! workflow state plus a [`Cursor`] telling the engine where to pick up. The
//! state is stored as opaque JSON so the saver never needs to know the
//! workflow's schema.
//!
//! # Cursor states
//!
//! | `next`      | `pending`  | Meaning                                   |
//! |-------------|------------|-------------------------------------------|
//! | `Some(n)`   | empty      | In flight: continue at node `n`            |
//! | `Some(n)`   | non-empty  | Suspended at `n`, waiting for responses    |
//! | `None`      | empty      | Completed: the run reached the end node    |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Unique identifier for a checkpoint
pub type CheckpointId = String;

/// Current on-disk format version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Where execution resumes for a thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    /// Node to execute next; `None` once the run completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    /// Serialized interrupt requests awaiting an external decision
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<Value>,
}

impl Cursor {
    /// Cursor pointing at a node, nothing pending
    pub fn at(node: impl Into<String>) -> Self {
        Self {
            next: Some(node.into()),
            pending: Vec::new(),
        }
    }

    /// Cursor for a run suspended at `node` with outstanding requests
    pub fn suspended(node: impl Into<String>, pending: Vec<Value>) -> Self {
        Self {
            next: Some(node.into()),
            pending,
        }
    }

    /// Cursor for a run that reached the end node
    pub fn completed() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.next.is_none()
    }

    pub fn is_suspended(&self) -> bool {
        self.next.is_some() && !self.pending.is_empty()
    }
}

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Input merged into the thread at the start of a run
    Input,
    /// Written after a node completed
    Loop,
    /// Written when a node suspended
    Interrupt,
    /// Written when responses cleared a suspension
    Resume,
}

/// Metadata associated with a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CheckpointMetadata {
    /// The source of the checkpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// Number of node executions on this thread so far
    #[serde(default)]
    pub step: u64,

    /// Node that produced this checkpoint, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,

    /// Additional custom metadata
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: u64) -> Self {
        self.step = step;
        self
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Snapshot of one thread's state and cursor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Format version
    pub v: u32,

    /// Unique checkpoint ID
    pub id: CheckpointId,

    /// Thread this checkpoint belongs to
    pub thread_id: String,

    /// When the checkpoint was created
    pub ts: DateTime<Utc>,

    /// Merged workflow state
    pub state: Value,

    /// Where execution resumes
    pub cursor: Cursor,

    #[serde(default)]
    pub metadata: CheckpointMetadata,

    /// Previous checkpoint on the same thread; filled in by the saver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<CheckpointId>,
}

impl Checkpoint {
    pub fn new(thread_id: impl Into<String>, state: Value, cursor: Cursor) -> Self {
        Self {
            v: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            ts: Utc::now(),
            state,
            cursor,
            metadata: CheckpointMetadata::default(),
            parent_id: None,
        }
    }

    pub fn with_metadata(mut self, metadata: CheckpointMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_states() {
        assert!(Cursor::completed().is_completed());
        assert!(!Cursor::at("a").is_completed());
        assert!(!Cursor::at("a").is_suspended());
        assert!(Cursor::suspended("a", vec![json!({"x": 1})]).is_suspended());
    }

    #[test]
    fn test_completed_cursor_omits_fields() {
        let value = serde_json::to_value(Cursor::completed()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_metadata_extra_is_flattened() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(3)
            .with_extra("configurable", json!({"user_id": "u1"}));
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["source"], "loop");
        assert_eq!(value["configurable"]["user_id"], "u1");

        let back: CheckpointMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }
}
