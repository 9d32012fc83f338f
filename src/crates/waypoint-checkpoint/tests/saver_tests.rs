//! Behaviour shared by every checkpoint backend

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use waypoint_checkpoint::{
    Checkpoint, CheckpointMetadata, CheckpointSaver, CheckpointSource, Cursor,
    FileCheckpointSaver, InMemoryCheckpointSaver,
};

async fn round_trip(saver: Arc<dyn CheckpointSaver>) {
    let state = json!({
        "messages": [{"id": "m1", "role": "user", "content": "Meeting?"}],
        "classification_decision": "respond",
    });
    let cursor = Cursor::suspended(
        "interrupt_handler",
        vec![json!({"action_request": {"action": "send_email_tool", "args": {}}})],
    );

    saver.save("thread-1", state.clone(), cursor.clone()).await.unwrap();
    let (loaded_state, loaded_cursor) = saver.load("thread-1").await.unwrap().unwrap();

    assert_eq!(loaded_state, state);
    assert_eq!(loaded_cursor, cursor);
}

async fn history(saver: Arc<dyn CheckpointSaver>) {
    for (step, node) in ["a", "b", "c"].into_iter().enumerate() {
        let checkpoint = Checkpoint::new("thread-h", json!({"step": step}), Cursor::at(node))
            .with_metadata(
                CheckpointMetadata::new()
                    .with_source(CheckpointSource::Loop)
                    .with_step(step as u64)
                    .with_node(node),
            );
        saver.put(checkpoint).await.unwrap();
    }

    let listed: Vec<Checkpoint> = saver
        .list("thread-h", None)
        .await
        .unwrap()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].cursor.next.as_deref(), Some("c"));
    assert_eq!(listed[0].parent_id.as_deref(), Some(listed[1].id.as_str()));
    assert_eq!(listed[2].metadata.step, 0);
}

#[tokio::test]
async fn test_in_memory_round_trip() {
    round_trip(Arc::new(InMemoryCheckpointSaver::new())).await;
}

#[tokio::test]
async fn test_in_memory_history() {
    history(Arc::new(InMemoryCheckpointSaver::new())).await;
}

#[tokio::test]
async fn test_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    round_trip(Arc::new(FileCheckpointSaver::open(dir.path()).await.unwrap())).await;
}

#[tokio::test]
async fn test_file_history() {
    let dir = tempfile::tempdir().unwrap();
    history(Arc::new(FileCheckpointSaver::open(dir.path()).await.unwrap())).await;
}

#[tokio::test]
async fn test_file_saver_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let saver = FileCheckpointSaver::open(dir.path()).await.unwrap();
        saver
            .save("thread-r", json!({"n": 7}), Cursor::completed())
            .await
            .unwrap();
    }

    let reopened = FileCheckpointSaver::open(dir.path()).await.unwrap();
    let (state, cursor) = reopened.load("thread-r").await.unwrap().unwrap();
    assert_eq!(state["n"], 7);
    assert!(cursor.is_completed());
}
