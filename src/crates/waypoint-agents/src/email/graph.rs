//! The email triage workflow
//!
//! ```text
//!  START ─► triage_router ──ignore──► END
//!              │      │
//!              │      └─notify─► triage_interrupt_handler ──ignore──► END
//!           respond                    │
//!              │                    respond
//!              ▼                       │
//!           llm_call ◄─────────────────┘
//!            │  ▲  │
//!            │  │  └─only Done─► mark_as_read ─► END
//!            │  │
//!            │  └── interrupt_handler ──ended──► END
//!            │             ▲
//!            └─tool calls──┘          (no tool calls ─► END)
//! ```
//!
//! Preferences live in the store under `("email_assistant", <kind>)` and are
//! refined by every human decision that is not a plain acceptance.

use super::actions::{tool_definitions, tools_prompt, EmailAction, DONE};
use super::format::{action_markdown, clean_thread, email_markdown};
use super::mailbox::{EmailActionExecutor, MailBackend};
use super::prompts::{
    AGENT_SYSTEM_PROMPT, DEFAULT_BACKGROUND, DEFAULT_CAL_PREFERENCES,
    DEFAULT_RESPONSE_PREFERENCES, DEFAULT_TRIAGE_INSTRUCTIONS, MEMORY_UPDATE_INSTRUCTIONS,
    MEMORY_UPDATE_REINFORCEMENT, TRIAGE_SYSTEM_PROMPT, TRIAGE_USER_PROMPT,
};
use super::schemas::{Classification, EmailInput, RouterSchema, CLASSIFICATION, EMAIL_INPUT};
use crate::template::fill;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use waypoint_core::{
    get_memory, ActionRequest, ChatRequest, CheckpointSaver, CompiledGraph, Decision,
    DecisionEffect, GraphError, HumanResponse, InterruptRequest, Message, Namespace, NodeContext,
    PreferenceSignal, PreferenceUpdater, ResponseModes, Result, ReviewHandler, ReviewMediator,
    ReviewableAction, Runtime, State, StateGraph, StepResult, ToolChoice, Update, END, START,
};

pub const TRIAGE_ROUTER: &str = "triage_router";
pub const TRIAGE_INTERRUPT_HANDLER: &str = "triage_interrupt_handler";
pub const LLM_CALL: &str = "llm_call";
pub const INTERRUPT_HANDLER: &str = "interrupt_handler";
pub const MARK_AS_READ: &str = "mark_as_read";

/// Store namespace root of the assistant's memories
pub const MEMORY_ROOT: &str = "email_assistant";
pub const TRIAGE_PREFERENCES: &str = "triage_preferences";
pub const RESPONSE_PREFERENCES: &str = "response_preferences";
pub const CAL_PREFERENCES: &str = "cal_preferences";

/// State field set once the email was marked read
pub const MARKED_AS_READ: &str = "marked_as_read";
/// State field describing a failed mark-as-read
pub const MARK_AS_READ_ERROR: &str = "mark_as_read_error";

const ASSISTANT_UNAVAILABLE: &str = "The assistant could not reach the model; no action was taken.";

/// Namespace of one preference kind
pub fn preferences_namespace(kind: &str) -> Namespace {
    Namespace::new([MEMORY_ROOT, kind])
}

/// Who the assistant works for, and the preferences it starts from
///
/// The preference texts only seed the store; once stored, the learned
/// versions take over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantProfile {
    pub background: String,
    pub triage_instructions: String,
    pub response_preferences: String,
    pub cal_preferences: String,
}

impl Default for AssistantProfile {
    fn default() -> Self {
        Self {
            background: DEFAULT_BACKGROUND.to_string(),
            triage_instructions: DEFAULT_TRIAGE_INSTRUCTIONS.to_string(),
            response_preferences: DEFAULT_RESPONSE_PREFERENCES.to_string(),
            cal_preferences: DEFAULT_CAL_PREFERENCES.to_string(),
        }
    }
}

fn preference_updater() -> PreferenceUpdater {
    PreferenceUpdater::new(format!(
        "{MEMORY_UPDATE_INSTRUCTIONS}\n\n{MEMORY_UPDATE_REINFORCEMENT}"
    ))
}

/// Builder of the email triage graph
pub struct EmailAssistant {
    backend: Arc<dyn MailBackend>,
    profile: AssistantProfile,
}

impl EmailAssistant {
    pub fn new(backend: Arc<dyn MailBackend>) -> Self {
        Self {
            backend,
            profile: AssistantProfile::default(),
        }
    }

    pub fn with_profile(mut self, profile: AssistantProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn profile(&self) -> &AssistantProfile {
        &self.profile
    }

    /// The uncompiled graph
    pub fn graph(&self) -> StateGraph {
        let nodes = Arc::new(EmailNodes {
            profile: self.profile.clone(),
            backend: self.backend.clone(),
            mediator: ReviewMediator::new(
                Arc::new(EmailActionExecutor::new(self.backend.clone())),
                Arc::new(EmailReviewHandler),
                LLM_CALL,
                END,
            )
            .with_preference_updater(preference_updater()),
        });

        let mut graph = StateGraph::new();
        let triage = nodes.clone();
        let notify = nodes.clone();
        let agent = nodes.clone();
        let review = nodes.clone();
        let reader = nodes;
        graph
            .add_node_with_destinations(
                TRIAGE_ROUTER,
                [LLM_CALL, TRIAGE_INTERRUPT_HANDLER, END],
                move |state: State, ctx: NodeContext| {
                    let nodes = triage.clone();
                    async move { nodes.triage_router(state, ctx).await }
                },
            )
            .add_node_with_destinations(
                TRIAGE_INTERRUPT_HANDLER,
                [LLM_CALL, END],
                move |state: State, ctx: NodeContext| {
                    let nodes = notify.clone();
                    async move { nodes.triage_interrupt_handler(state, ctx).await }
                },
            )
            .add_node(LLM_CALL, move |state: State, ctx: NodeContext| {
                let nodes = agent.clone();
                async move { nodes.llm_call(state, ctx).await }
            })
            .add_node_with_destinations(
                INTERRUPT_HANDLER,
                [LLM_CALL, END],
                move |state: State, ctx: NodeContext| {
                    let nodes = review.clone();
                    async move { nodes.mediator.process(&state, &ctx).await }
                },
            )
            .add_node(MARK_AS_READ, move |state: State, ctx: NodeContext| {
                let nodes = reader.clone();
                async move { nodes.mark_as_read(state, ctx).await }
            })
            .add_edge(START, TRIAGE_ROUTER)
            .add_conditional_edges(
                LLM_CALL,
                route_after_llm,
                [
                    (INTERRUPT_HANDLER, INTERRUPT_HANDLER),
                    (MARK_AS_READ, MARK_AS_READ),
                    (END, END),
                ],
            )
            .add_edge(MARK_AS_READ, END);
        graph
    }

    pub fn compile(&self, runtime: Runtime, checkpointer: Arc<dyn CheckpointSaver>) -> Result<CompiledGraph> {
        self.graph().compile(runtime, checkpointer)
    }
}

/// Next step after the model proposed its actions
fn route_after_llm(state: &State) -> Result<String> {
    let next = match state.last_message() {
        Some(message) if message.is_assistant() && message.has_tool_calls() => {
            if message.tool_calls.iter().all(|call| call.name == DONE) {
                MARK_AS_READ
            } else {
                INTERRUPT_HANDLER
            }
        }
        _ => END,
    };
    Ok(next.to_string())
}

struct EmailNodes {
    profile: AssistantProfile,
    backend: Arc<dyn MailBackend>,
    mediator: ReviewMediator<EmailAction>,
}

impl EmailNodes {
    async fn preferences(&self, ctx: &NodeContext, kind: &str, default: &str) -> Result<String> {
        get_memory(ctx.store(), &preferences_namespace(kind), default).await
    }

    #[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
    async fn triage_router(&self, state: State, ctx: NodeContext) -> Result<StepResult> {
        let email: EmailInput = state.require(EMAIL_INPUT)?;
        let triage_instructions = self
            .preferences(&ctx, TRIAGE_PREFERENCES, &self.profile.triage_instructions)
            .await?;

        let system = fill(
            TRIAGE_SYSTEM_PROMPT,
            &[
                ("background", &self.profile.background),
                ("triage_instructions", &triage_instructions),
            ],
        );
        let thread = clean_thread(email.thread_or_empty());
        let user = fill(
            TRIAGE_USER_PROMPT,
            &[
                ("author", email.author_or_empty()),
                ("to", email.to_or_empty()),
                ("subject", email.subject_or_empty()),
                ("email_thread", &thread),
            ],
        );
        let request = ChatRequest::new(vec![Message::system(system), Message::user(user)])
            .with_output_schema(RouterSchema::output_schema())
            .with_temperature(0.0);

        let classification = match ctx.invoke_model(request).await? {
            Some(response) => match response.parse::<RouterSchema>() {
                Ok(router) => {
                    info!(classification = %router.classification, reasoning = %router.reasoning, "Email triaged");
                    router.classification
                }
                Err(err) => {
                    warn!(error = %err, "Unusable triage answer, asking the user");
                    Classification::Notify
                }
            },
            None => Classification::Notify,
        };

        let update = Update::new().field_from(CLASSIFICATION, &classification)?;
        Ok(match classification {
            Classification::Ignore => StepResult::goto(update, END),
            Classification::Notify => StepResult::goto(update, TRIAGE_INTERRUPT_HANDLER),
            Classification::Respond => StepResult::goto(
                update.message(Message::user(format!(
                    "Respond to the following email:\n\n{}",
                    email_markdown(&email)
                ))),
                LLM_CALL,
            ),
        })
    }

    #[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
    async fn triage_interrupt_handler(&self, state: State, ctx: NodeContext) -> Result<StepResult> {
        let email: EmailInput = state.require(EMAIL_INPUT)?;
        let markdown = email_markdown(&email);
        let classification = state
            .get_as::<Classification>(CLASSIFICATION)?
            .unwrap_or(Classification::Notify);

        let Some(response) = ctx.take_response() else {
            let request = InterruptRequest::new(
                ActionRequest::new(format!("Email Assistant: {classification}"), json!({})),
                ResponseModes::ignore_or_respond(),
                markdown,
            );
            return Ok(StepResult::suspend(request));
        };

        let notice = Message::user(format!("Email to notify user about: {markdown}"));
        let namespace = preferences_namespace(TRIAGE_PREFERENCES);
        let updater = preference_updater();
        match response {
            HumanResponse::Ignore => {
                let feedback = Message::user(
                    "The user decided to ignore the email even though it was classified as notify. \
                     Update triage preferences to capture this.",
                );
                updater
                    .update(&ctx, &namespace, vec![notice.clone(), feedback.clone()])
                    .await?;
                info!("Notification dismissed");
                Ok(StepResult::goto(Update::new().messages([notice, feedback]), END))
            }
            HumanResponse::Response(text) => {
                let feedback =
                    Message::user(format!("User wants to respond to the email. Use this feedback to respond: {text}"));
                updater
                    .update(
                        &ctx,
                        &namespace,
                        vec![
                            Message::user(
                                "The user decided to respond to the email, so update the triage preferences to capture this.",
                            ),
                            notice.clone(),
                            feedback.clone(),
                        ],
                    )
                    .await?;
                Ok(StepResult::goto(Update::new().messages([notice, feedback]), LLM_CALL))
            }
            other => Err(GraphError::ResponseNotPermitted {
                action: format!("Email Assistant: {classification}"),
                response: other.kind().to_string(),
            }),
        }
    }

    #[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id(), step = ctx.step()))]
    async fn llm_call(&self, state: State, ctx: NodeContext) -> Result<StepResult> {
        let response_preferences = self
            .preferences(&ctx, RESPONSE_PREFERENCES, &self.profile.response_preferences)
            .await?;
        let cal_preferences = self
            .preferences(&ctx, CAL_PREFERENCES, &self.profile.cal_preferences)
            .await?;
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let tools = tools_prompt();
        let system = fill(
            AGENT_SYSTEM_PROMPT,
            &[
                ("tools_prompt", &tools),
                ("today", &today),
                ("background", &self.profile.background),
                ("response_preferences", &response_preferences),
                ("cal_preferences", &cal_preferences),
            ],
        );

        let mut messages = vec![Message::system(system)];
        messages.extend(state.messages.iter().cloned());
        let request = ChatRequest::new(messages)
            .with_tools(tool_definitions())
            .with_tool_choice(ToolChoice::Required)
            .with_temperature(0.0);

        let message = match ctx.invoke_model(request).await? {
            Some(response) => response.message,
            None => Message::assistant(ASSISTANT_UNAVAILABLE),
        };
        if message.has_tool_calls() {
            let proposed: Vec<&str> = message.tool_calls.iter().map(|call| call.name.as_str()).collect();
            info!(tools = ?proposed, "Model proposed actions");
        }
        Ok(StepResult::update(Update::new().message(message)))
    }

    #[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
    async fn mark_as_read(&self, state: State, ctx: NodeContext) -> Result<StepResult> {
        let email: EmailInput = state.require(EMAIL_INPUT)?;

        // Done calls are answered here since the mediator never sees them
        let mut update = Update::new();
        if let Some(message) = state.last_message() {
            for call in &message.tool_calls {
                update = update.message(Message::tool("Email handled.", &call.id).with_payload(json!({
                    "action": call.name,
                    "review_state": "accepted",
                    "executed": true
                })));
            }
        }

        let Some(email_id) = email.id.as_deref() else {
            warn!("Email has no id, cannot mark it read");
            return Ok(StepResult::update(
                update
                    .field(MARKED_AS_READ, json!(false))
                    .field(MARK_AS_READ_ERROR, json!("email has no id")),
            ));
        };
        match self.backend.mark_as_read(email_id).await {
            Ok(()) => {
                info!(email_id, "Email marked read");
                Ok(StepResult::update(update.field(MARKED_AS_READ, json!(true))))
            }
            Err(err) => {
                warn!(email_id, error = %err, "Failed to mark email read");
                Ok(StepResult::update(
                    update
                        .field(MARKED_AS_READ, json!(false))
                        .field(MARK_AS_READ_ERROR, json!(err.to_string())),
                ))
            }
        }
    }
}

/// Presentation and preference learning for email actions
pub struct EmailReviewHandler;

fn feedback(text: impl std::fmt::Display) -> Message {
    Message::user(format!(
        "{text} Follow all instructions above, and remember: {MEMORY_UPDATE_REINFORCEMENT}"
    ))
}

impl ReviewHandler<EmailAction> for EmailReviewHandler {
    fn describe(&self, state: &State, action: &EmailAction) -> String {
        let email = state
            .get_as::<EmailInput>(EMAIL_INPUT)
            .ok()
            .flatten()
            .map(|email| email_markdown(&email));
        match email {
            Some(email) => format!("{email}\n\n{}", action_markdown(action)),
            None => action_markdown(action),
        }
    }

    fn on_decision(
        &self,
        _state: &State,
        action: &EmailAction,
        decision: &Decision<EmailAction>,
    ) -> Result<DecisionEffect> {
        let response_ns = preferences_namespace(RESPONSE_PREFERENCES);
        let cal_ns = preferences_namespace(CAL_PREFERENCES);
        let triage_ns = preferences_namespace(TRIAGE_PREFERENCES);

        let effect = match (action, decision) {
            (EmailAction::SendEmail(_), Decision::Edited(edited)) => DecisionEffect::new(
                PreferenceSignal::new(
                    response_ns,
                    vec![feedback(format!(
                        "User edited the email response. Here is the initial email generated by the assistant: {}. Here is the edited email: {}.",
                        action.args()?,
                        edited.args()?
                    ))],
                )
                .without_history(),
            ),
            (EmailAction::ScheduleMeeting(_), Decision::Edited(edited)) => DecisionEffect::new(
                PreferenceSignal::new(
                    cal_ns,
                    vec![feedback(format!(
                        "User edited the calendar invitation. Here is the initial calendar invitation generated by the assistant: {}. Here is the edited calendar invitation: {}.",
                        action.args()?,
                        edited.args()?
                    ))],
                )
                .without_history(),
            ),
            (EmailAction::SendEmail(_), Decision::Ignored) => DecisionEffect::new(
                PreferenceSignal::new(
                    response_ns,
                    vec![feedback(
                        "The user ignored the email draft. That means they did not want to respond to the email. \
                         Update the preferences to ensure emails of this type are not answered.",
                    )],
                )
                .without_history(),
            )
            .with_tool_message("User ignored this email draft. Ignore this email and end the workflow.")
            .ending_run(),
            (EmailAction::ScheduleMeeting(_), Decision::Ignored) => DecisionEffect::new(
                PreferenceSignal::new(
                    cal_ns,
                    vec![feedback(
                        "The user ignored the calendar meeting draft. This means they did not want to schedule a meeting for this email. \
                         Update the preferences to ensure meetings like this are not proposed.",
                    )],
                )
                .without_history(),
            )
            .with_tool_message("User ignored this calendar meeting draft. Ignore this email and end the workflow.")
            .ending_run(),
            (EmailAction::Question(_), Decision::Ignored) => DecisionEffect::new(PreferenceSignal::new(
                triage_ns,
                vec![feedback(
                    "The user ignored the Question. That means they did not want to answer the question or deal with this email. \
                     Update the triage preferences to ensure emails of this type are not classified as respond.",
                )],
            ))
            .with_tool_message("User ignored this question. Ignore this email and end the workflow.")
            .ending_run(),
            (EmailAction::SendEmail(_), Decision::Responded(text)) => DecisionEffect::new(PreferenceSignal::new(
                response_ns,
                vec![feedback("User gave feedback, which we can use to update the response preferences.")],
            ))
            .with_tool_message(format!(
                "User gave feedback, which can we incorporate into the email. Feedback: {text}"
            )),
            (EmailAction::ScheduleMeeting(_), Decision::Responded(text)) => DecisionEffect::new(PreferenceSignal::new(
                cal_ns,
                vec![feedback("User gave feedback, which we can use to update calendar preferences.")],
            ))
            .with_tool_message(format!(
                "User gave feedback, which can we incorporate into the meeting request. Feedback: {text}"
            )),
            (EmailAction::Question(_), Decision::Responded(text)) => DecisionEffect::new(PreferenceSignal::new(
                cal_ns,
                vec![feedback("User gave feedback, which we can use to update the calendar preferences.")],
            ))
            .with_tool_message(format!(
                "User answered the question, which we can use for any follow-up actions. Feedback: {text}"
            )),
            (other, decision) => {
                return Err(GraphError::Configuration(format!(
                    "no review handling for {:?} on '{}'",
                    decision_kind(decision),
                    other.name()
                )))
            }
        };
        Ok(effect)
    }
}

fn decision_kind<A>(decision: &Decision<A>) -> &'static str {
    match decision {
        Decision::Edited(_) => "edit",
        Decision::Ignored => "ignore",
        Decision::Responded(_) => "response",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::actions::{DoneArgs, QuestionArgs, SendEmailArgs};
    use waypoint_core::ToolCall;

    fn reply(text: &str) -> EmailAction {
        EmailAction::SendEmail(SendEmailArgs {
            email_id: "m1".into(),
            response_text: text.into(),
            email_address: "me@example.com".into(),
            additional_recipients: vec![],
        })
    }

    #[test]
    fn test_route_after_llm() {
        let mut state = State::new();
        assert_eq!(route_after_llm(&state).unwrap(), END);

        state.messages.push(Message::assistant("done").with_tool_calls(vec![ToolCall::new(
            DONE,
            serde_json::to_value(DoneArgs { done: true }).unwrap(),
        )]));
        assert_eq!(route_after_llm(&state).unwrap(), MARK_AS_READ);

        state.messages.push(
            Message::assistant("")
                .with_tool_calls(vec![ToolCall::new("send_email_tool", json!({})), ToolCall::new(DONE, json!({}))]),
        );
        assert_eq!(route_after_llm(&state).unwrap(), INTERRUPT_HANDLER);
    }

    #[test]
    fn test_edit_learns_response_preferences_without_history() {
        let effect = EmailReviewHandler
            .on_decision(&State::new(), &reply("Sure"), &Decision::Edited(reply("Sure, Tuesday works")))
            .unwrap();
        assert_eq!(effect.preference.namespace, preferences_namespace(RESPONSE_PREFERENCES));
        assert!(!effect.preference.include_history);
        assert!(!effect.end_run);
        assert!(effect.preference.messages[0].content.contains("Tuesday works"));
    }

    #[test]
    fn test_ignored_question_ends_run_and_updates_triage() {
        let question = EmailAction::Question(QuestionArgs { content: "Which day?".into() });
        let effect = EmailReviewHandler
            .on_decision(&State::new(), &question, &Decision::Ignored)
            .unwrap();
        assert!(effect.end_run);
        assert!(effect.preference.include_history);
        assert_eq!(effect.preference.namespace, preferences_namespace(TRIAGE_PREFERENCES));
    }

    #[test]
    fn test_profile_defaults_fill_missing_fields() {
        let profile: AssistantProfile = serde_json::from_value(json!({"background": "I run a bakery."})).unwrap();
        assert_eq!(profile.background, "I run a bakery.");
        assert_eq!(profile.cal_preferences, DEFAULT_CAL_PREFERENCES);
    }
}
