//! End-to-end runs of the email assistant against a scripted model

use serde_json::{json, Value};
use std::sync::Arc;
use waypoint_agents::email::graph::{
    preferences_namespace, CAL_PREFERENCES, MARKED_AS_READ, MARK_AS_READ_ERROR, RESPONSE_PREFERENCES,
    TRIAGE_PREFERENCES,
};
use waypoint_agents::email::{
    EmailAssistant, EmailInput, InMemoryMailbox, MailOperation, MailboxEvent, SendEmailArgs,
};
use waypoint_core::testing::ScriptedModel;
use waypoint_core::{
    CompiledGraph, HumanResponse, InMemoryCheckpointSaver, InMemoryStore, ModelError, Role, RetryPolicy,
    Runtime, State, Store, ToolCall, UserPreferences, PREFERENCES_KEY,
};

struct Harness {
    graph: CompiledGraph,
    model: ScriptedModel,
    mailbox: InMemoryMailbox,
    store: Arc<InMemoryStore>,
}

impl Harness {
    fn new(model: ScriptedModel) -> Self {
        Self::with_mailbox(model, InMemoryMailbox::new())
    }

    fn with_mailbox(model: ScriptedModel, mailbox: InMemoryMailbox) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let runtime = Runtime::new(store.clone())
            .with_model(Arc::new(model.clone()))
            .with_retry_policy(RetryPolicy::immediate(2));
        let graph = EmailAssistant::new(Arc::new(mailbox.clone()))
            .compile(runtime, Arc::new(InMemoryCheckpointSaver::new()))
            .unwrap();
        Self {
            graph,
            model,
            mailbox,
            store,
        }
    }

    async fn preferences(&self, kind: &str) -> Option<Value> {
        self.store
            .get(&preferences_namespace(kind), PREFERENCES_KEY)
            .await
            .unwrap()
            .map(|item| item.value)
    }

    fn preference_updates(&self) -> usize {
        self.model.requests_with_schema(UserPreferences::SCHEMA_NAME)
    }
}

fn meeting_email() -> EmailInput {
    EmailInput::new("Meeting?")
        .with_author("Ana <ana@example.com>")
        .with_to("me@example.com")
        .with_thread("Hi, can we meet on Tuesday to discuss the roadmap?\n\nAna")
        .with_id("msg-42")
}

fn triage(classification: &str) -> Value {
    json!({"reasoning": "test", "classification": classification})
}

fn reply_args(text: &str) -> Value {
    json!({
        "email_id": "msg-42",
        "response_text": text,
        "email_address": "me@example.com"
    })
}

fn done() -> ToolCall {
    ToolCall::new("Done", json!({"done": true})).with_id("done-1")
}

fn learned(text: &str) -> Value {
    json!({"chain_of_thought": "feedback", "user_preferences": text})
}

#[tokio::test]
async fn test_meeting_scenario_edit_learns_response_preferences() {
    let model = ScriptedModel::new()
        .then_structured(triage("respond"))
        .then_tool_calls(vec![
            ToolCall::new("send_email_tool", reply_args("Sure, Tuesday works.")).with_id("c1"),
        ])
        .then_structured(learned("Sign replies with a first name."))
        .then_tool_calls(vec![done()]);
    let harness = Harness::new(model);

    let outcome = harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    let interrupts = outcome.interrupts();
    assert_eq!(interrupts.len(), 1);
    assert_eq!(interrupts[0].action_request.action, "send_email_tool");
    assert!(interrupts[0].description.contains("## Email: Meeting?"));
    assert!(harness.mailbox.sent().is_empty());

    let edited = reply_args("Tuesday at 10:00 works. Best, Sam");
    let state = harness
        .graph
        .resume("t1", vec![HumanResponse::edit("send_email_tool", edited.clone())])
        .await
        .unwrap()
        .into_state()
        .unwrap();

    let sent: SendEmailArgs = serde_json::from_value(edited).unwrap();
    assert_eq!(harness.mailbox.sent(), vec![sent.clone()]);

    // The proposal is rewritten in place with the edited arguments
    let proposal = state
        .messages
        .iter()
        .find(|m| m.tool_calls.iter().any(|c| c.id == "c1"))
        .unwrap();
    assert_eq!(proposal.tool_calls[0].args, serde_json::to_value(&sent).unwrap());

    let result = state
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap();
    assert_eq!(result.payload.as_ref().unwrap()["review_state"], "edited");
    assert_eq!(result.payload.as_ref().unwrap()["executed"], true);

    assert_eq!(harness.preference_updates(), 1);
    assert_eq!(
        harness.preferences(RESPONSE_PREFERENCES).await,
        Some(json!("Sign replies with a first name."))
    );
    assert_eq!(state.get(MARKED_AS_READ), Some(&json!(true)));
    assert!(harness
        .mailbox
        .events()
        .contains(&MailboxEvent::MarkedRead("msg-42".into())));
}

#[tokio::test]
async fn test_ignore_classification_ends_without_interrupts() {
    let harness = Harness::new(ScriptedModel::new().then_structured(triage("ignore")));

    let outcome = harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    assert!(outcome.interrupts().is_empty());
    let state = outcome.into_state().unwrap();
    assert_eq!(state.get("classification_decision"), Some(&json!("ignore")));
    assert!(state.messages.is_empty());
    assert_eq!(harness.model.call_count(), 1);
    assert!(harness.mailbox.events().is_empty());
}

#[tokio::test]
async fn test_ignored_draft_is_never_sent_and_learns_once() {
    let model = ScriptedModel::new()
        .then_structured(triage("respond"))
        .then_tool_calls(vec![
            ToolCall::new("send_email_tool", reply_args("Sure!")).with_id("c1"),
            ToolCall::new("check_calendar_tool", json!({"dates": ["02-05-2025"]})).with_id("c2"),
        ])
        .then_structured(learned("Do not answer meeting requests from Ana."));
    let harness = Harness::new(model);

    harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    let state = harness
        .graph
        .resume("t1", vec![HumanResponse::Ignore])
        .await
        .unwrap()
        .into_state()
        .unwrap();

    assert!(harness.mailbox.events().is_empty());
    assert_eq!(harness.preference_updates(), 1);
    assert_eq!(harness.model.remaining(), 0);

    let results: Vec<_> = state.messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].content.starts_with("User ignored this email draft"));
    assert_eq!(results[0].payload.as_ref().unwrap()["executed"], false);
    assert_eq!(results[1].tool_call_id.as_deref(), Some("c2"));
    assert_eq!(results[1].payload.as_ref().unwrap()["discarded"], true);
}

#[tokio::test]
async fn test_notify_then_respond_drafts_a_reply() {
    let model = ScriptedModel::new()
        .then_structured(triage("notify"))
        .then_structured(learned("Reply to roadmap questions."))
        .then_tool_calls(vec![done()]);
    let harness = Harness::new(model);

    let outcome = harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    let request = &outcome.interrupts()[0];
    assert_eq!(request.action_request.action, "Email Assistant: notify");
    assert!(!request.config.allow_accept);
    assert!(!request.config.allow_edit);

    let state = harness
        .graph
        .resume("t1", vec![HumanResponse::respond("Say yes to Tuesday")])
        .await
        .unwrap()
        .into_state()
        .unwrap();
    assert!(state
        .messages
        .iter()
        .any(|m| m.role == Role::User && m.content.contains("Say yes to Tuesday")));
    assert_eq!(
        harness.preferences(TRIAGE_PREFERENCES).await,
        Some(json!("Reply to roadmap questions."))
    );
}

#[tokio::test]
async fn test_notify_rejects_accept_without_touching_the_thread() {
    let harness = Harness::new(ScriptedModel::new().then_structured(triage("notify")));

    harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    let before = harness.graph.get_state("t1").await.unwrap().unwrap();

    let err = harness
        .graph
        .resume("t1", vec![HumanResponse::Accept])
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    let after = harness.graph.get_state("t1").await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_unavailable_triage_model_asks_the_user() {
    let model = ScriptedModel::new()
        .then_error(ModelError::Transient("overloaded".into()))
        .then_error(ModelError::Transient("overloaded".into()));
    let harness = Harness::new(model);

    let outcome = harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome.interrupts()[0].action_request.action, "Email Assistant: notify");
}

#[tokio::test]
async fn test_question_answer_loops_back_to_the_model() {
    let model = ScriptedModel::new()
        .then_structured(triage("respond"))
        .then_tool_calls(vec![
            ToolCall::new("Question", json!({"content": "Which Tuesday?"})).with_id("q1"),
        ])
        .then_structured(learned("Tuesdays mean next week."))
        .then_tool_calls(vec![done()]);
    let harness = Harness::new(model);

    harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    let state = harness
        .graph
        .resume("t1", vec![HumanResponse::respond("Next week")])
        .await
        .unwrap()
        .into_state()
        .unwrap();

    let answer = state
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("q1"))
        .unwrap();
    assert!(answer.content.ends_with("Feedback: Next week"));
    assert_eq!(
        harness.preferences(CAL_PREFERENCES).await,
        Some(json!("Tuesdays mean next week."))
    );
}

#[tokio::test]
async fn test_mark_as_read_failure_is_recorded() {
    let model = ScriptedModel::new()
        .then_structured(triage("respond"))
        .then_tool_calls(vec![done()]);
    let mailbox = InMemoryMailbox::new().failing(MailOperation::MarkRead);
    let harness = Harness::with_mailbox(model, mailbox);

    let state: State = harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap()
        .into_state()
        .unwrap();
    assert_eq!(state.get(MARKED_AS_READ), Some(&json!(false)));
    assert!(state.get_str(MARK_AS_READ_ERROR).unwrap().contains("unavailable"));
}

#[tokio::test]
async fn test_malformed_tool_arguments_go_back_to_the_model() {
    let model = ScriptedModel::new()
        .then_structured(triage("respond"))
        .then_tool_calls(vec![
            ToolCall::new("send_email_tool", json!({"response_text": "hi"})).with_id("c1"),
        ])
        .then_tool_calls(vec![done()]);
    let harness = Harness::new(model);

    let outcome = harness
        .graph
        .run("t1", meeting_email().into_update().unwrap())
        .await
        .unwrap();
    assert!(outcome.interrupts().is_empty());
    let state = outcome.into_state().unwrap();

    let result = state
        .messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c1"))
        .unwrap();
    assert!(result.content.starts_with("Error: invalid arguments for send_email_tool"));
    assert_eq!(result.payload.as_ref().unwrap()["error"], true);
    assert_eq!(result.payload.as_ref().unwrap()["executed"], false);

    assert_eq!(harness.model.call_count(), 3);
    assert!(harness.model.requests()[2]
        .messages
        .iter()
        .any(|m| m.content.contains("missing field `email_id`")));
    assert!(harness.mailbox.sent().is_empty());
    assert_eq!(harness.preference_updates(), 0);
}
