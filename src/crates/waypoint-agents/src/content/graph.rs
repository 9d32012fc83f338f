//! The content manager workflow
//!
//! `content_manager` chats with the user and calls `UpdateMemory` for every
//! memory it wants refreshed. Each call is answered by the matching update
//! node, one call per step, before control returns to `content_manager`.

use super::prompts::{CREATE_GUIDELINES, EXTRACTION_INSTRUCTION, MODEL_SYSTEM_MESSAGE};
use super::schemas::{update_memory_tool, ContentItem, Profile, UpdateType};
use crate::template::fill;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use waypoint_core::messages::{answered_tool_calls, last_tool_call_message, merge_message_runs};
use waypoint_core::{
    CheckpointSaver, ChatRequest, CompiledGraph, Extractor, Message, Namespace, NodeContext,
    RecordSchema, Result, Runtime, State, StateGraph, StepResult, ToolCall, ToolChoice, Update,
    END, START,
};

pub const CONTENT_MANAGER: &str = "content_manager";
pub const UPDATE_PROFILE: &str = "update_profile";
pub const UPDATE_CONTENT_CALENDAR: &str = "update_content_calendar";
pub const UPDATE_GUIDELINES: &str = "update_guidelines";

/// Run config key naming whose memories a thread reads and writes
pub const USER_ID: &str = "user_id";
/// Key of the guidelines record
pub const GUIDELINES_KEY: &str = "content_guidelines";

const MODEL_UNAVAILABLE: &str = "Sorry, I can't reach the model right now. Please try again in a moment.";

pub fn profile_namespace(user_id: &str) -> Namespace {
    Namespace::new(["profile", user_id])
}

pub fn calendar_namespace(user_id: &str) -> Namespace {
    Namespace::new(["content_calendar", user_id])
}

pub fn guidelines_namespace(user_id: &str) -> Namespace {
    Namespace::new(["guidelines", user_id])
}

/// Builder of the content manager graph
#[derive(Debug, Clone, Default)]
pub struct ContentManager;

impl ContentManager {
    pub fn new() -> Self {
        Self
    }

    pub fn graph(&self) -> StateGraph {
        let routes = [
            (UPDATE_PROFILE, UPDATE_PROFILE),
            (UPDATE_CONTENT_CALENDAR, UPDATE_CONTENT_CALENDAR),
            (UPDATE_GUIDELINES, UPDATE_GUIDELINES),
            (CONTENT_MANAGER, CONTENT_MANAGER),
            (END, END),
        ];

        let mut graph = StateGraph::new();
        graph
            .add_node(CONTENT_MANAGER, content_manager)
            .add_node(UPDATE_PROFILE, update_profile)
            .add_node(UPDATE_CONTENT_CALENDAR, update_content_calendar)
            .add_node(UPDATE_GUIDELINES, update_guidelines)
            .add_edge(START, CONTENT_MANAGER);
        for node in [CONTENT_MANAGER, UPDATE_PROFILE, UPDATE_CONTENT_CALENDAR, UPDATE_GUIDELINES] {
            graph.add_conditional_edges(node, route_memory_updates, routes);
        }
        graph
    }

    pub fn compile(&self, runtime: Runtime, checkpointer: Arc<dyn CheckpointSaver>) -> Result<CompiledGraph> {
        self.graph().compile(runtime, checkpointer)
    }
}

/// Position of the tool-calling message and its first unanswered call
fn pending_call(state: &State) -> Option<(usize, &ToolCall)> {
    let position = last_tool_call_message(&state.messages)?;
    let answered = answered_tool_calls(&state.messages, position);
    state.messages[position]
        .tool_calls
        .iter()
        .find(|call| !answered.contains(&call.id))
        .map(|call| (position, call))
}

fn route_memory_updates(state: &State) -> Result<String> {
    if let Some(last) = state.last_message() {
        if last.is_assistant() && !last.has_tool_calls() {
            return Ok(END.to_string());
        }
    }
    let next = match pending_call(state) {
        Some((_, call)) => match UpdateType::from_tool_call(call)? {
            UpdateType::User => UPDATE_PROFILE,
            UpdateType::ContentCalendar => UPDATE_CONTENT_CALENDAR,
            UpdateType::Guidelines => UPDATE_GUIDELINES,
        },
        None if state.last_message().is_some() => CONTENT_MANAGER,
        None => END,
    };
    Ok(next.to_string())
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
async fn content_manager(state: State, ctx: NodeContext) -> Result<StepResult> {
    let user_id = ctx.require_config(USER_ID)?.to_string();
    let store = ctx.store();

    let profile = store
        .search(&profile_namespace(&user_id))
        .await?
        .into_iter()
        .next()
        .map(|item| render_value(&item.value))
        .unwrap_or_else(|| "None".to_string());
    let calendar = store
        .search(&calendar_namespace(&user_id))
        .await?
        .iter()
        .map(|item| format!("{}: {}", item.key, item.value))
        .collect::<Vec<_>>()
        .join("\n");
    let guidelines = store
        .get(&guidelines_namespace(&user_id), GUIDELINES_KEY)
        .await?
        .and_then(|item| item.value.get("memory").map(render_value))
        .unwrap_or_default();

    let system = fill(
        MODEL_SYSTEM_MESSAGE,
        &[
            ("user_profile", &profile),
            ("content_calendar", &calendar),
            ("guidelines", &guidelines),
        ],
    );
    let mut messages = vec![Message::system(system)];
    messages.extend(state.messages.iter().cloned());
    let request = ChatRequest::new(messages)
        .with_tools(vec![update_memory_tool()])
        .with_tool_choice(ToolChoice::Auto)
        .with_parallel_tool_calls(true);

    let message = match ctx.invoke_model(request).await? {
        Some(response) => response.message,
        None => Message::assistant(MODEL_UNAVAILABLE),
    };
    if message.has_tool_calls() {
        info!(updates = message.tool_calls.len(), "Memory updates requested");
    }
    Ok(StepResult::update(Update::new().message(message)))
}

/// The call an update node answers and the conversation before it
fn take_call(state: &State) -> Result<(ToolCall, Vec<Message>)> {
    let (position, call) = pending_call(state).ok_or_else(|| {
        waypoint_core::GraphError::InvalidInput("no memory update is pending".into())
    })?;
    let conversation = merge_message_runs(state.messages[..position].to_vec());
    Ok((call.clone(), conversation))
}

fn extraction_instruction() -> String {
    fill(EXTRACTION_INSTRUCTION, &[("time", &chrono::Utc::now().to_rfc3339())])
}

async fn run_extractor(
    ctx: &NodeContext,
    state: &State,
    schema: RecordSchema,
    namespace: Namespace,
) -> Result<(ToolCall, waypoint_core::ApplyReport)> {
    let (call, conversation) = take_call(state)?;
    let extractor = Extractor::new(schema).with_instructions(extraction_instruction());
    let report = extractor.run(ctx, &namespace, conversation).await?;
    if !report.is_clean() {
        warn!(failures = report.failures().len(), record = %report.record, "Some record updates failed");
    }
    Ok((call, report))
}

fn answer(call: &ToolCall, text: impl Into<String>, payload: Value) -> StepResult {
    StepResult::update(Update::new().message(Message::tool(text, &call.id).with_payload(payload)))
}

#[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
async fn update_profile(state: State, ctx: NodeContext) -> Result<StepResult> {
    let user_id = ctx.require_config(USER_ID)?.to_string();
    let (call, report) =
        run_extractor(&ctx, &state, Profile::record_schema(), profile_namespace(&user_id)).await?;
    let text = if report.is_clean() {
        "Updated user profile".to_string()
    } else {
        report.summary()
    };
    Ok(answer(&call, text, json!({"update_type": "user", "applied": report.applied()})))
}

#[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
async fn update_content_calendar(state: State, ctx: NodeContext) -> Result<StepResult> {
    let user_id = ctx.require_config(USER_ID)?.to_string();
    let (call, report) = run_extractor(
        &ctx,
        &state,
        ContentItem::record_schema(),
        calendar_namespace(&user_id),
    )
    .await?;
    Ok(answer(
        &call,
        report.summary(),
        json!({"update_type": "content_calendar", "applied": report.applied()}),
    ))
}

#[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
async fn update_guidelines(state: State, ctx: NodeContext) -> Result<StepResult> {
    let user_id = ctx.require_config(USER_ID)?.to_string();
    let namespace = guidelines_namespace(&user_id);
    let (call, conversation) = take_call(&state)?;

    let current = ctx
        .store()
        .get(&namespace, GUIDELINES_KEY)
        .await?
        .and_then(|item| item.value.get("memory").map(render_value))
        .unwrap_or_default();
    let mut messages = vec![Message::system(fill(CREATE_GUIDELINES, &[("guidelines", &current)]))];
    messages.extend(conversation);
    messages.push(Message::user("Please update the guidelines."));

    let Some(response) = ctx.invoke_model(ChatRequest::new(messages)).await? else {
        return Ok(answer(
            &call,
            "Content creation guidelines unchanged: the model is unavailable",
            json!({"update_type": "guidelines", "applied": 0}),
        ));
    };
    ctx.store()
        .put(&namespace, GUIDELINES_KEY, json!({"memory": response.message.content}))
        .await?;
    info!("Guidelines updated");
    Ok(answer(
        &call,
        "Updated content creation guidelines",
        json!({"update_type": "guidelines", "applied": 1}),
    ))
}
