//! Tests for tool-call review and preference learning

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use waypoint_core::testing::ScriptedModel;
use waypoint_core::{
    get_memory, ActionError, ActionExecutor, CompiledGraph, Decision, DecisionEffect, GraphError,
    HumanResponse, InMemoryCheckpointSaver, InMemoryStore, Message, ModelError, Namespace, NodeContext,
    PreferenceSignal, ResponseModes, Result, ReviewHandler, ReviewMediator, ReviewPolicy,
    ReviewableAction, Role, Runtime, State, StateGraph, StepResult, ToolCall, Update,
    UserPreferences, END, START,
};

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Publish { text: String },
    Lookup { query: String },
    Ask { question: String },
}

fn arg(call: &ToolCall, name: &str) -> Result<String> {
    call.args
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GraphError::invalid_tool_arguments(&call.name, format!("missing '{name}'")))
}

impl ReviewableAction for Action {
    fn from_tool_call(call: &ToolCall) -> Result<Self> {
        match call.name.as_str() {
            "publish" => Ok(Action::Publish { text: arg(call, "text")? }),
            "lookup" => Ok(Action::Lookup { query: arg(call, "query")? }),
            "ask" => Ok(Action::Ask { question: arg(call, "question")? }),
            other => Err(GraphError::Configuration(format!("unknown tool '{other}'"))),
        }
    }

    fn name(&self) -> &str {
        match self {
            Action::Publish { .. } => "publish",
            Action::Lookup { .. } => "lookup",
            Action::Ask { .. } => "ask",
        }
    }

    fn args(&self) -> Result<Value> {
        Ok(match self {
            Action::Publish { text } => json!({ "text": text }),
            Action::Lookup { query } => json!({ "query": query }),
            Action::Ask { question } => json!({ "question": question }),
        })
    }

    fn policy(&self) -> ReviewPolicy {
        match self {
            Action::Publish { .. } => ReviewPolicy::Review(ResponseModes::all()),
            Action::Lookup { .. } => ReviewPolicy::AutoExecute,
            Action::Ask { .. } => ReviewPolicy::Review(ResponseModes::ignore_or_respond()),
        }
    }
}

#[derive(Default)]
struct Recorder {
    executed: Mutex<Vec<Action>>,
}

#[async_trait]
impl ActionExecutor<Action> for Recorder {
    async fn execute(&self, action: &Action) -> std::result::Result<String, ActionError> {
        self.executed.lock().push(action.clone());
        match action {
            Action::Lookup { query } if query == "fail" => Err(ActionError::new("backend offline")),
            Action::Lookup { query } => Ok(format!("found {query}")),
            Action::Publish { text } => Ok(format!("published {text}")),
            Action::Ask { .. } => Ok("asked".into()),
        }
    }
}

struct Handler;

impl ReviewHandler<Action> for Handler {
    fn describe(&self, _state: &State, action: &Action) -> String {
        format!("Review {}", action.name())
    }

    fn on_decision(&self, _state: &State, action: &Action, decision: &Decision<Action>) -> Result<DecisionEffect> {
        let signal = PreferenceSignal::new(
            Namespace::from(["test", "prefs"]),
            vec![Message::user(format!("feedback on {}", action.name()))],
        );
        let effect = DecisionEffect::new(signal);
        Ok(match (action, decision) {
            (Action::Publish { .. }, Decision::Ignored) => effect
                .with_tool_message("User declined to publish. Ignore this and end the workflow.")
                .ending_run(),
            _ => effect,
        })
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    model: ScriptedModel,
    recorder: Arc<Recorder>,
    mediator: ReviewMediator<Action>,
}

impl Harness {
    async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        get_memory(store.as_ref(), &Namespace::from(["test", "prefs"]), "Keep it short.")
            .await
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let mediator = ReviewMediator::new(recorder.clone(), Arc::new(Handler), "agent", END);
        Self {
            store,
            model: ScriptedModel::new(),
            recorder,
            mediator,
        }
    }

    fn expect_preference_update(mut self, text: &str) -> Self {
        self.model = self.model.then_structured(json!({
            "chain_of_thought": "learned",
            "user_preferences": text
        }));
        self
    }

    fn ctx(&self, responses: Vec<HumanResponse>) -> NodeContext {
        let runtime = Runtime::new(self.store.clone()).with_model(Arc::new(self.model.clone()));
        NodeContext::detached("thread", runtime).with_responses(responses)
    }

    fn executed(&self) -> Vec<Action> {
        self.recorder.executed.lock().clone()
    }

    async fn preferences(&self) -> String {
        get_memory(self.store.as_ref(), &Namespace::from(["test", "prefs"]), "")
            .await
            .unwrap()
    }
}

fn proposal(calls: Vec<ToolCall>) -> State {
    let mut state = State::new();
    state.messages.push(Message::user("do things"));
    state
        .messages
        .push(Message::assistant("").with_id("ai-1").with_tool_calls(calls));
    state
}

fn apply(state: &mut State, result: &StepResult) {
    waypoint_core::StateSchema::new()
        .apply(state, result.update_ref().clone())
        .unwrap();
}

#[tokio::test]
async fn test_auto_execute_runs_without_review() {
    let harness = Harness::new().await;
    let state = proposal(vec![ToolCall::new("lookup", json!({"query": "rust"})).with_id("c1")]);

    let result = harness.mediator.process(&state, &harness.ctx(vec![])).await.unwrap();

    assert_eq!(result.goto_target(), Some("agent"));
    let reply = &result.update_ref().messages[0];
    assert_eq!(reply.role, Role::Tool);
    assert_eq!(reply.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(reply.content, "found rust");
    assert_eq!(
        reply.payload,
        Some(json!({"action": "lookup", "review_state": "accepted", "executed": true}))
    );
    assert_eq!(harness.model.call_count(), 0);
}

#[tokio::test]
async fn test_partial_progress_survives_suspension() {
    let harness = Harness::new().await;
    let mut state = proposal(vec![
        ToolCall::new("lookup", json!({"query": "docs"})).with_id("c1"),
        ToolCall::new("publish", json!({"text": "hello"})).with_id("c2"),
    ]);

    let first = harness.mediator.process(&state, &harness.ctx(vec![])).await.unwrap();
    let StepResult::Suspend { update, requests } = &first else {
        panic!("expected suspension");
    };
    assert_eq!(update.messages.len(), 1);
    assert_eq!(requests[0].action_request.action, "publish");
    assert_eq!(requests[0].description, "Review publish");
    apply(&mut state, &first);

    let second = harness
        .mediator
        .process(&state, &harness.ctx(vec![HumanResponse::Accept]))
        .await
        .unwrap();
    assert_eq!(second.goto_target(), Some("agent"));
    assert_eq!(
        harness.executed(),
        vec![
            Action::Lookup { query: "docs".into() },
            Action::Publish { text: "hello".into() }
        ]
    );
    assert_eq!(harness.model.call_count(), 0);
}

#[tokio::test]
async fn test_edit_rewrites_proposal_and_learns_once() {
    let harness = Harness::new().await.expect_preference_update("Keep it short. Sign as Lance.");
    let mut state = proposal(vec![ToolCall::new("publish", json!({"text": "draft"})).with_id("c1")]);

    let result = harness
        .mediator
        .process(
            &state,
            &harness.ctx(vec![HumanResponse::edit("publish", json!({"text": "final"}))]),
        )
        .await
        .unwrap();
    apply(&mut state, &result);

    assert_eq!(state.messages.len(), 3);
    assert_eq!(state.messages[1].id, "ai-1");
    assert_eq!(state.messages[1].tool_calls[0].args, json!({"text": "final"}));
    assert_eq!(state.messages[1].tool_calls[0].id, "c1");
    assert_eq!(state.messages[2].content, "published final");
    assert_eq!(state.messages[2].payload.as_ref().unwrap()["review_state"], "edited");

    assert_eq!(harness.executed(), vec![Action::Publish { text: "final".into() }]);
    assert_eq!(harness.model.requests_with_schema(UserPreferences::SCHEMA_NAME), 1);
    assert_eq!(harness.preferences().await, "Keep it short. Sign as Lance.");
}

#[tokio::test]
async fn test_ignore_ends_run_and_discards_the_rest() {
    let harness = Harness::new().await.expect_preference_update("Never publish on weekends.");
    let state = proposal(vec![
        ToolCall::new("publish", json!({"text": "x"})).with_id("c1"),
        ToolCall::new("lookup", json!({"query": "y"})).with_id("c2"),
    ]);

    let result = harness
        .mediator
        .process(&state, &harness.ctx(vec![HumanResponse::Ignore]))
        .await
        .unwrap();

    assert_eq!(result.goto_target(), Some(END));
    assert!(harness.executed().is_empty());
    let messages = &result.update_ref().messages;
    assert_eq!(messages.len(), 2);
    assert!(messages[0].content.contains("declined to publish"));
    assert_eq!(messages[0].payload.as_ref().unwrap()["executed"], false);
    assert_eq!(messages[1].tool_call_id.as_deref(), Some("c2"));
    assert_eq!(messages[1].payload.as_ref().unwrap()["discarded"], true);
    assert_eq!(harness.model.requests_with_schema(UserPreferences::SCHEMA_NAME), 1);
}

#[tokio::test]
async fn test_response_becomes_tool_result() {
    let harness = Harness::new().await.expect_preference_update("Answer questions directly.");
    let state = proposal(vec![ToolCall::new("ask", json!({"question": "When?"})).with_id("c1")]);

    let result = harness
        .mediator
        .process(&state, &harness.ctx(vec![HumanResponse::respond("Tuesday")]))
        .await
        .unwrap();

    assert_eq!(result.goto_target(), Some("agent"));
    let reply = &result.update_ref().messages[0];
    assert_eq!(reply.content, "Tuesday");
    assert_eq!(reply.payload.as_ref().unwrap()["review_state"], "responded");
    assert!(harness.executed().is_empty());
    assert_eq!(harness.model.requests_with_schema(UserPreferences::SCHEMA_NAME), 1);
}

#[tokio::test]
async fn test_response_type_not_allowed() {
    let harness = Harness::new().await;
    let state = proposal(vec![ToolCall::new("ask", json!({"question": "When?"})).with_id("c1")]);

    let err = harness
        .mediator
        .process(&state, &harness.ctx(vec![HumanResponse::Accept]))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ResponseNotPermitted { .. }));
    assert!(harness.executed().is_empty());
}

#[tokio::test]
async fn test_execution_failure_is_reported_not_raised() {
    let harness = Harness::new().await;
    let state = proposal(vec![ToolCall::new("lookup", json!({"query": "fail"})).with_id("c1")]);

    let result = harness.mediator.process(&state, &harness.ctx(vec![])).await.unwrap();
    let reply = &result.update_ref().messages[0];
    assert_eq!(reply.content, "Error: backend offline");
    assert_eq!(reply.payload.as_ref().unwrap()["error"], true);
}

#[tokio::test]
async fn test_unknown_tool_is_a_configuration_error() {
    let harness = Harness::new().await;
    let state = proposal(vec![ToolCall::new("rm_rf", json!({})).with_id("c1")]);

    let err = harness.mediator.process(&state, &harness.ctx(vec![])).await.unwrap_err();
    assert!(matches!(err, GraphError::Configuration(_)));
}

#[tokio::test]
async fn test_invalid_arguments_are_answered_not_raised() {
    let harness = Harness::new().await;
    let state = proposal(vec![
        ToolCall::new("publish", json!({"body": "wrong field"})).with_id("c1"),
        ToolCall::new("lookup", json!({"query": "rust"})).with_id("c2"),
    ]);

    let result = harness.mediator.process(&state, &harness.ctx(vec![])).await.unwrap();

    assert_eq!(result.goto_target(), Some("agent"));
    let messages = &result.update_ref().messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(messages[0].content, "Error: invalid arguments for publish: missing 'text'");
    assert_eq!(
        messages[0].payload,
        Some(json!({"action": "publish", "review_state": "proposed", "executed": false, "error": true}))
    );
    assert_eq!(messages[1].content, "found rust");
    assert_eq!(harness.executed(), vec![Action::Lookup { query: "rust".into() }]);
}

#[tokio::test]
async fn test_failed_preference_update_keeps_the_executed_result() {
    let mut harness = Harness::new().await;
    harness.model = harness
        .model
        .then_error(ModelError::Permanent("quota exhausted".into()));
    let state = proposal(vec![ToolCall::new("publish", json!({"text": "draft"})).with_id("c1")]);

    let result = harness
        .mediator
        .process(
            &state,
            &harness.ctx(vec![HumanResponse::edit("publish", json!({"text": "edited"}))]),
        )
        .await
        .unwrap();

    assert_eq!(result.goto_target(), Some("agent"));
    assert_eq!(harness.executed(), vec![Action::Publish { text: "edited".into() }]);
    let reply = result
        .update_ref()
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap();
    assert_eq!(reply.content, "published edited");
    let payload = reply.payload.as_ref().unwrap();
    assert_eq!(payload["review_state"], "edited");
    assert!(payload["preference_error"].as_str().unwrap().contains("quota exhausted"));
    assert_eq!(harness.preferences().await, "Keep it short.");
}

async fn agent(state: State, _ctx: NodeContext) -> Result<StepResult> {
    let answered = state.messages.iter().any(|m| m.role == Role::Tool);
    let message = if answered {
        Message::assistant("all done")
    } else {
        Message::assistant("")
            .with_id("ai-1")
            .with_tool_calls(vec![ToolCall::new("publish", json!({"text": "post"})).with_id("c1")])
    };
    Ok(StepResult::update(Update::from(message)))
}

fn agent_graph(harness: &Harness) -> CompiledGraph {
    let mediator = harness.mediator.clone();
    let mut graph = StateGraph::new();
    graph
        .add_node("agent", agent)
        .add_node_with_destinations("review", ["agent", END], move |state: State, ctx: NodeContext| {
            let mediator = mediator.clone();
            async move { mediator.process(&state, &ctx).await }
        })
        .add_edge(START, "agent")
        .add_conditional_edges(
            "agent",
            |state: &State| {
                let pending = state.last_message().is_some_and(Message::has_tool_calls);
                Ok(if pending { "review" } else { "done" }.to_string())
            },
            [("review", "review"), ("done", END)],
        );
    graph
        .compile(
            Runtime::new(harness.store.clone()).with_model(Arc::new(harness.model.clone())),
            Arc::new(InMemoryCheckpointSaver::new()),
        )
        .unwrap()
}

#[tokio::test]
async fn test_review_round_trip_through_graph() {
    let harness = Harness::new().await;
    let graph = agent_graph(&harness);

    let outcome = graph.run("t", Update::from(Message::user("post it"))).await.unwrap();
    assert_eq!(outcome.interrupts().len(), 1);
    assert!(harness.executed().is_empty());

    let state = graph
        .resume("t", vec![HumanResponse::Accept])
        .await
        .unwrap()
        .into_state()
        .unwrap();
    assert_eq!(harness.executed(), vec![Action::Publish { text: "post".into() }]);
    assert_eq!(state.last_message().unwrap().content, "all done");
}
