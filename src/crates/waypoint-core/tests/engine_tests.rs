//! Integration tests for the graph engine
//!
//! These exercise complete runs through compiled graphs: suspension and
//! resumption, routing failures, thread isolation and persistence.

use serde_json::json;
use std::sync::Arc;
use waypoint_core::{
    ActionRequest, CheckpointSaver, CompiledGraph, FileCheckpointSaver, GraphError, HumanResponse,
    InMemoryCheckpointSaver, InterruptRequest, Message, NodeContext, Reducer, Result, RunConfig,
    RunOutcome, Runtime, State, StateGraph, StateSchema, StepResult, Update, END, START,
};

async fn echo(state: State, _ctx: NodeContext) -> Result<StepResult> {
    let seen = state.messages.len();
    Ok(StepResult::update(Update::from(Message::assistant(format!(
        "seen {seen}"
    )))))
}

async fn approval(_state: State, ctx: NodeContext) -> Result<StepResult> {
    match ctx.take_response() {
        None => Ok(StepResult::suspend(InterruptRequest::new(
            ActionRequest::new("publish", json!({"draft": "hello"})),
            waypoint_core::ResponseModes::ignore_or_respond(),
            "Publish the draft?",
        ))),
        Some(HumanResponse::Response(text)) => {
            Ok(StepResult::update(Update::from(Message::user(text))))
        }
        Some(_) => Ok(StepResult::goto(Update::new().field("ignored", json!(true)), END)),
    }
}

async fn whoami(_state: State, ctx: NodeContext) -> Result<StepResult> {
    let user = ctx.require_config("user_id")?.to_string();
    Ok(StepResult::update(Update::from(Message::assistant(user))))
}

fn review_graph(checkpointer: Arc<dyn CheckpointSaver>) -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph
        .add_node("draft", echo)
        .add_node_with_destinations("approval", [END], approval)
        .add_node("finish", echo)
        .add_edge(START, "draft")
        .add_edge("draft", "approval")
        .add_edge("approval", "finish")
        .add_edge("finish", END);
    graph.compile(Runtime::default(), checkpointer).unwrap()
}

fn linear_graph() -> CompiledGraph {
    let mut graph = StateGraph::new();
    graph
        .add_node("first", echo)
        .add_node("second", echo)
        .add_edge(START, "first")
        .add_edge("first", "second")
        .add_edge("second", END);
    graph
        .compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap()
}

#[tokio::test]
async fn test_linear_run_completes() {
    let graph = linear_graph();
    let outcome = graph
        .run("t1", Update::from(Message::user("hi")))
        .await
        .unwrap();

    let state = outcome.into_state().unwrap();
    let texts: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["hi", "seen 1", "seen 2"]);

    let snapshot = graph.get_state("t1").await.unwrap().unwrap();
    assert!(snapshot.is_completed());
    assert_eq!(snapshot.step, 2);
    assert!(graph.history("t1", None).await.unwrap().len() >= 3);
}

#[tokio::test]
async fn test_completed_thread_continues_with_more_input() {
    let graph = linear_graph();
    graph.run("t", Update::from(Message::user("one"))).await.unwrap();
    let state = graph
        .run("t", Update::from(Message::user("two")))
        .await
        .unwrap()
        .into_state()
        .unwrap();

    assert_eq!(state.messages.len(), 6);
    assert_eq!(state.messages[0].content, "one");
    assert_eq!(state.messages[3].content, "two");
}

#[tokio::test]
async fn test_suspend_and_resume() {
    let graph = review_graph(Arc::new(InMemoryCheckpointSaver::new()));

    let outcome = graph
        .run("t", Update::from(Message::user("write")))
        .await
        .unwrap();
    assert!(outcome.is_interrupted());
    assert_eq!(outcome.interrupts()[0].action_request.action, "publish");

    let snapshot = graph.get_state("t").await.unwrap().unwrap();
    assert!(snapshot.is_suspended());
    assert_eq!(snapshot.next.as_deref(), Some("approval"));

    let again = graph.run("t", Update::new()).await.unwrap();
    assert_eq!(again.interrupts(), outcome.interrupts());

    let state = graph
        .resume("t", vec![HumanResponse::respond("ship it")])
        .await
        .unwrap()
        .into_state()
        .unwrap();
    let texts: Vec<&str> = state.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(texts, vec!["write", "seen 1", "ship it", "seen 3"]);
    assert!(graph.get_state("t").await.unwrap().unwrap().is_completed());
}

#[tokio::test]
async fn test_ignore_jumps_to_end() {
    let graph = review_graph(Arc::new(InMemoryCheckpointSaver::new()));
    graph.run("t", Update::from(Message::user("write"))).await.unwrap();

    let state = graph
        .resume("t", vec![HumanResponse::Ignore])
        .await
        .unwrap()
        .into_state()
        .unwrap();
    assert_eq!(state.get("ignored"), Some(&json!(true)));
    assert_eq!(state.messages.len(), 2);
}

#[tokio::test]
async fn test_rejected_resume_leaves_thread_untouched() {
    let graph = review_graph(Arc::new(InMemoryCheckpointSaver::new()));
    graph.run("t", Update::from(Message::user("write"))).await.unwrap();
    let before = graph.history("t", None).await.unwrap();

    let err = graph.resume("t", vec![HumanResponse::Accept]).await.unwrap_err();
    assert!(matches!(err, GraphError::ResponseNotPermitted { .. }));
    assert!(err.is_rejection());

    let err = graph.resume("t", vec![]).await.unwrap_err();
    assert!(matches!(
        err,
        GraphError::ResponseCountMismatch {
            expected: 1,
            actual: 0,
            ..
        }
    ));

    let after = graph.history("t", None).await.unwrap();
    assert_eq!(before, after);
    assert!(after[0].is_suspended());
}

#[tokio::test]
async fn test_resume_without_suspension() {
    let graph = linear_graph();
    let err = graph.resume("nobody", vec![]).await.unwrap_err();
    assert!(matches!(err, GraphError::NothingToResume { .. }));

    graph.run("done", Update::new()).await.unwrap();
    let err = graph
        .resume("done", vec![HumanResponse::Accept])
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::NothingToResume { .. }));
}

#[tokio::test]
async fn test_unknown_route_fails_fast() {
    let mut graph = StateGraph::new();
    graph
        .add_node("classify", echo)
        .add_node("respond", echo)
        .add_edge(START, "classify")
        .add_conditional_edges(
            "classify",
            |_: &State| Ok("escalate".to_string()),
            [("respond", "respond"), ("ignore", END)],
        )
        .add_edge("respond", END);
    let graph = graph
        .compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap();

    let err = graph.run("t", Update::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::Configuration(ref m) if m.contains("escalate")));
}

#[tokio::test]
async fn test_unknown_goto_fails_fast() {
    let mut graph = StateGraph::new();
    graph
        .add_node_with_destinations("jump", [END], |_state: State, _ctx: NodeContext| async {
            Ok(StepResult::goto(Update::new(), "nowhere"))
        })
        .add_edge(START, "jump");
    let graph = graph
        .compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap();

    assert!(matches!(
        graph.run("t", Update::new()).await,
        Err(GraphError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_recursion_limit() {
    let mut graph = StateGraph::new();
    graph
        .add_node("spin", echo)
        .add_edge(START, "spin")
        .add_edge("spin", "spin");
    let graph = graph
        .compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap()
        .with_recursion_limit(5);

    let err = graph.run("t", Update::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::RecursionLimit { limit: 5 }));
}

#[tokio::test]
async fn test_empty_thread_id_rejected() {
    let graph = linear_graph();
    let err = graph.run("  ", Update::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::InvalidInput(_)));
}

#[tokio::test]
async fn test_distinct_threads_run_concurrently() {
    let graph = linear_graph();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let graph = graph.clone();
            tokio::spawn(async move {
                graph
                    .run(&format!("thread-{i}"), Update::from(Message::user(format!("m{i}"))))
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let state = handle.await.unwrap().unwrap().into_state().unwrap();
        assert_eq!(state.messages[0].content, format!("m{i}"));
        assert_eq!(state.messages.len(), 3);
    }
}

#[tokio::test]
async fn test_same_thread_runs_are_serialized() {
    let schema = StateSchema::new().field(
        "count",
        Reducer::custom(|current, update| {
            let current = current.and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(current + update.as_i64().unwrap_or(0)))
        }),
    );
    let mut graph = StateGraph::with_schema(schema);
    graph
        .add_node("count", |_state: State, _ctx: NodeContext| async {
            tokio::task::yield_now().await;
            Ok(StepResult::update(Update::new().field("count", json!(1))))
        })
        .add_edge(START, "count")
        .add_edge("count", END);
    let graph = graph
        .compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap();

    let runs: Vec<_> = (0..10)
        .map(|_| {
            let graph = graph.clone();
            tokio::spawn(async move { graph.run("shared", Update::new()).await })
        })
        .collect();
    for run in runs {
        run.await.unwrap().unwrap();
    }

    let snapshot = graph.get_state("shared").await.unwrap().unwrap();
    assert_eq!(snapshot.state.get("count"), Some(&json!(10)));
    assert_eq!(graph.active_threads(), 0);
}

#[tokio::test]
async fn test_finished_threads_release_their_locks() {
    let graph = review_graph(Arc::new(InMemoryCheckpointSaver::new()));
    for i in 0..5 {
        graph
            .run(&format!("t{i}"), Update::from(Message::user("write")))
            .await
            .unwrap();
    }
    assert_eq!(graph.active_threads(), 0);

    graph.resume("t0", vec![HumanResponse::respond("ok")]).await.unwrap();
    let err = graph.resume("t0", vec![HumanResponse::Ignore]).await.unwrap_err();
    assert!(matches!(err, GraphError::NothingToResume { .. }));
    assert_eq!(graph.active_threads(), 0);
}

#[tokio::test]
async fn test_run_config_is_kept_with_the_thread() {
    let mut graph = StateGraph::new();
    graph
        .add_node("whoami", whoami)
        .add_edge(START, "whoami")
        .add_edge("whoami", END);
    let graph = graph
        .compile(Runtime::default(), Arc::new(InMemoryCheckpointSaver::new()))
        .unwrap();

    let config = RunConfig::new().with("user_id", "ada");
    graph.run_with_config("t", Update::new(), config.clone()).await.unwrap();
    let state = graph.run("t", Update::new()).await.unwrap().into_state().unwrap();

    assert_eq!(state.messages[1].content, "ada");
    assert_eq!(graph.get_state("t").await.unwrap().unwrap().config, config);

    let err = graph.run("other", Update::new()).await.unwrap_err();
    assert!(matches!(err, GraphError::InvalidInput(_)));
}

#[tokio::test]
async fn test_cancel_drops_pending_interrupts() {
    let graph = review_graph(Arc::new(InMemoryCheckpointSaver::new()));
    graph.run("t", Update::from(Message::user("write"))).await.unwrap();

    assert!(graph.cancel("t").await.unwrap());
    assert!(graph.get_state("t").await.unwrap().is_none());
    assert!(!graph.cancel("t").await.unwrap());

    let outcome = graph.run("t", Update::from(Message::user("again"))).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Interrupted { .. }));
}

#[tokio::test]
async fn test_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = review_graph(Arc::new(FileCheckpointSaver::open(dir.path()).await.unwrap()));
    first.run("t", Update::from(Message::user("write"))).await.unwrap();
    drop(first);

    let second = review_graph(Arc::new(FileCheckpointSaver::open(dir.path()).await.unwrap()));
    let snapshot = second.get_state("t").await.unwrap().unwrap();
    assert!(snapshot.is_suspended());

    let state = second
        .resume("t", vec![HumanResponse::respond("ok")])
        .await
        .unwrap()
        .into_state()
        .unwrap();
    assert_eq!(state.messages.last().unwrap().content, "seen 3");
}
