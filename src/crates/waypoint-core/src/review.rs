//! Human review of proposed tool calls
//!
//! The [`ReviewMediator`] sits between the model proposing tool calls and
//! their execution. Each proposed call moves through a small state machine:
//!
//! ```text
//!  Proposed ──auto──────────────────────────────► Accepted ─► execute
//!     │
//!     └─review─► UnderReview ──accept───────────► Accepted ─► execute
//!                    │        ──edit─────────────► Edited ──► execute edited args
//!                    │        ──ignore───────────► Ignored    (not executed)
//!                    │        ──response─────────► Responded  (not executed)
//!                    └─ no response yet: suspend the thread
//! ```
//!
//! Every terminal state other than `Accepted` triggers exactly one
//! preference update. What an `Ignored` or `Responded` call reports back,
//! and which preferences learn from it, is decided per action by a
//! [`ReviewHandler`].

use crate::error::{GraphError, Result};
use crate::interrupt::{ActionRequest, HumanResponse, InterruptRequest, ResponseModes};
use crate::memory::PreferenceUpdater;
use crate::messages::{add_messages, answered_tool_calls, last_tool_call_message, Message, ToolCall};
use crate::node_result::StepResult;
use crate::runtime::NodeContext;
use crate::state::{State, Update};
use crate::store::Namespace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Where a proposed tool call is in its review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Proposed,
    UnderReview,
    Accepted,
    Edited,
    Ignored,
    Responded,
}

impl ReviewState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReviewState::Proposed | ReviewState::UnderReview)
    }

    /// Terminal states in which the action runs
    pub fn executes(self) -> bool {
        matches!(self, ReviewState::Accepted | ReviewState::Edited)
    }

    pub fn can_transition_to(self, next: ReviewState) -> bool {
        use ReviewState::*;
        matches!(
            (self, next),
            (Proposed, UnderReview)
                | (Proposed, Accepted)
                | (UnderReview, Accepted)
                | (UnderReview, Edited)
                | (UnderReview, Ignored)
                | (UnderReview, Responded)
        )
    }

    /// State reached from `UnderReview` by a human response
    pub fn after(response: &HumanResponse) -> ReviewState {
        match response {
            HumanResponse::Accept => ReviewState::Accepted,
            HumanResponse::Edit(_) => ReviewState::Edited,
            HumanResponse::Ignore => ReviewState::Ignored,
            HumanResponse::Response(_) => ReviewState::Responded,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewState::Proposed => "proposed",
            ReviewState::UnderReview => "under_review",
            ReviewState::Accepted => "accepted",
            ReviewState::Edited => "edited",
            ReviewState::Ignored => "ignored",
            ReviewState::Responded => "responded",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an action needs a human before it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewPolicy {
    AutoExecute,
    Review(ResponseModes),
}

/// A closed set of actions the model may propose
pub trait ReviewableAction: Clone + Send + Sync + Sized + 'static {
    /// Parse a proposed call
    ///
    /// Unknown names are [`GraphError::Configuration`]; a known name with
    /// unusable arguments is [`GraphError::InvalidToolArguments`], which the
    /// mediator reports back to the model instead of failing.
    fn from_tool_call(call: &ToolCall) -> Result<Self>;

    fn name(&self) -> &str;

    fn args(&self) -> Result<Value>;

    fn policy(&self) -> ReviewPolicy;

    /// Same action with replacement arguments
    fn with_args(&self, args: Value) -> Result<Self> {
        Self::from_tool_call(&ToolCall::new(self.name(), args))
    }
}

/// An action that failed while executing
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ActionError(pub String);

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Runs accepted actions; the output becomes the tool-result text
#[async_trait]
pub trait ActionExecutor<A>: Send + Sync {
    async fn execute(&self, action: &A) -> std::result::Result<String, ActionError>;
}

/// A human decision other than plain acceptance
#[derive(Debug, Clone, PartialEq)]
pub enum Decision<A> {
    /// Carries the edited action
    Edited(A),
    Ignored,
    /// Carries the feedback text
    Responded(String),
}

/// Which preferences learn from a decision
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceSignal {
    pub namespace: Namespace,
    /// Feedback messages for the updater
    pub messages: Vec<Message>,
    /// Prepend the conversation so far
    pub include_history: bool,
}

impl PreferenceSignal {
    pub fn new(namespace: Namespace, messages: Vec<Message>) -> Self {
        Self {
            namespace,
            messages,
            include_history: true,
        }
    }

    pub fn without_history(mut self) -> Self {
        self.include_history = false;
        self
    }
}

/// Consequences of a decision
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEffect {
    /// Tool-result text; `None` keeps the default (execution output, the
    /// feedback, or a generic note for ignored calls)
    pub tool_message: Option<String>,
    /// Stop the run after this call
    pub end_run: bool,
    pub preference: PreferenceSignal,
}

impl DecisionEffect {
    pub fn new(preference: PreferenceSignal) -> Self {
        Self {
            tool_message: None,
            end_run: false,
            preference,
        }
    }

    pub fn with_tool_message(mut self, text: impl Into<String>) -> Self {
        self.tool_message = Some(text.into());
        self
    }

    pub fn ending_run(mut self) -> Self {
        self.end_run = true;
        self
    }
}

/// Per-action presentation and decision handling
pub trait ReviewHandler<A>: Send + Sync {
    /// Text shown to the reviewer
    fn describe(&self, state: &State, action: &A) -> String;

    /// `action` is the call as proposed
    fn on_decision(&self, state: &State, action: &A, decision: &Decision<A>) -> Result<DecisionEffect>;
}

const IGNORED_TEXT: &str = "User ignored this action.";
const SKIPPED_TEXT: &str = "Skipped: the run ended before this action was reviewed.";

/// Reviews and executes the latest proposed tool calls
pub struct ReviewMediator<A> {
    executor: Arc<dyn ActionExecutor<A>>,
    handler: Arc<dyn ReviewHandler<A>>,
    preferences: PreferenceUpdater,
    continue_to: String,
    end_to: String,
}

impl<A> Clone for ReviewMediator<A> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            handler: self.handler.clone(),
            preferences: self.preferences.clone(),
            continue_to: self.continue_to.clone(),
            end_to: self.end_to.clone(),
        }
    }
}

impl<A: ReviewableAction> ReviewMediator<A> {
    /// `continue_to` follows a completed review, `end_to` an ended run
    pub fn new(
        executor: Arc<dyn ActionExecutor<A>>,
        handler: Arc<dyn ReviewHandler<A>>,
        continue_to: impl Into<String>,
        end_to: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            handler,
            preferences: PreferenceUpdater::default(),
            continue_to: continue_to.into(),
            end_to: end_to.into(),
        }
    }

    pub fn with_preference_updater(mut self, preferences: PreferenceUpdater) -> Self {
        self.preferences = preferences;
        self
    }

    /// Review every unanswered call of the latest tool-calling message
    #[tracing::instrument(skip_all, fields(thread_id = %ctx.thread_id()))]
    pub async fn process(&self, state: &State, ctx: &NodeContext) -> Result<StepResult> {
        let position = last_tool_call_message(&state.messages).ok_or_else(|| {
            GraphError::InvalidInput("no assistant message with tool calls to review".into())
        })?;
        let answered = answered_tool_calls(&state.messages, position);
        let mut proposal = state.messages[position].clone();
        let calls = proposal.tool_calls.clone();

        let mut working = state.clone();
        let mut update = Update::new();
        let mut ended = false;

        for (index, call) in calls.iter().enumerate() {
            if answered.contains(&call.id) {
                continue;
            }
            let action = match A::from_tool_call(call) {
                Ok(action) => action,
                Err(GraphError::InvalidToolArguments { tool, error }) => {
                    warn!(action = %tool, error = %error, "Proposed call has invalid arguments");
                    let result = tool_result(
                        call,
                        &format!("Error: invalid arguments for {tool}: {error}"),
                        ReviewState::Proposed,
                        false,
                        true,
                    );
                    update.messages.push(result.clone());
                    working.messages = add_messages(std::mem::take(&mut working.messages), vec![result]);
                    continue;
                }
                Err(err) => return Err(err),
            };

            let (review_state, content, executed, failed, effect) = match action.policy() {
                ReviewPolicy::AutoExecute => {
                    let (content, failed) = self.execute(&action).await;
                    (ReviewState::Accepted, content, true, failed, None)
                }
                ReviewPolicy::Review(modes) => {
                    let Some(response) = ctx.take_response() else {
                        let request = InterruptRequest::new(
                            ActionRequest::new(action.name(), action.args()?),
                            modes,
                            self.handler.describe(&working, &action),
                        );
                        info!(
                            action = action.name(),
                            from = %ReviewState::Proposed,
                            to = %ReviewState::UnderReview,
                            "Awaiting review"
                        );
                        return Ok(StepResult::suspend_with(update, vec![request]));
                    };
                    if !modes.permits(&response) {
                        return Err(GraphError::ResponseNotPermitted {
                            action: action.name().to_string(),
                            response: response.kind().to_string(),
                        });
                    }

                    let next = ReviewState::after(&response);
                    debug_assert!(ReviewState::UnderReview.can_transition_to(next));
                    match response {
                        HumanResponse::Accept => {
                            let (content, failed) = self.execute(&action).await;
                            (next, content, true, failed, None)
                        }
                        HumanResponse::Edit(request) => {
                            if request.action != action.name() {
                                warn!(
                                    proposed = action.name(),
                                    edited = %request.action,
                                    "Edit names a different action; keeping the proposed one"
                                );
                            }
                            let edited = action.with_args(request.args)?;
                            proposal.tool_calls[index].args = edited.args()?;
                            update.messages.push(proposal.clone());
                            working.messages = add_messages(
                                std::mem::take(&mut working.messages),
                                vec![proposal.clone()],
                            );

                            let (content, failed) = self.execute(&edited).await;
                            let effect = self.handler.on_decision(&working, &action, &Decision::Edited(edited))?;
                            (next, content, true, failed, Some(effect))
                        }
                        HumanResponse::Ignore => {
                            let effect = self.handler.on_decision(&working, &action, &Decision::Ignored)?;
                            let content = effect.tool_message.clone().unwrap_or_else(|| IGNORED_TEXT.to_string());
                            (next, content, false, false, Some(effect))
                        }
                        HumanResponse::Response(feedback) => {
                            let effect = self.handler.on_decision(
                                &working,
                                &action,
                                &Decision::Responded(feedback.clone()),
                            )?;
                            let content = effect.tool_message.clone().unwrap_or(feedback);
                            (next, content, false, false, Some(effect))
                        }
                    }
                }
            };

            info!(action = action.name(), review_state = %review_state, executed, "Tool call reviewed");
            let mut result = tool_result(call, &content, review_state, executed, failed);
            working.messages = add_messages(std::mem::take(&mut working.messages), vec![result.clone()]);

            if let Some(effect) = &effect {
                if let Err(err) = self.learn(ctx, &working, &effect.preference).await {
                    warn!(action = action.name(), error = %err, "Preference update failed, keeping current preferences");
                    if let Some(payload) = result.payload.as_mut() {
                        payload["preference_error"] = Value::String(err.to_string());
                    }
                    working.messages = add_messages(std::mem::take(&mut working.messages), vec![result.clone()]);
                }
            }
            update.messages.push(result);

            if let Some(effect) = effect {
                if effect.end_run {
                    ended = true;
                    let skipped = calls[index + 1..]
                        .iter()
                        .filter(|call| !answered.contains(&call.id))
                        .map(|call| {
                            Message::tool(SKIPPED_TEXT, &call.id).with_payload(json!({
                                "action": call.name,
                                "review_state": ReviewState::Proposed,
                                "executed": false,
                                "discarded": true
                            }))
                        })
                        .collect::<Vec<_>>();
                    if !skipped.is_empty() {
                        debug!(skipped = skipped.len(), "Discarding remaining tool calls");
                    }
                    update.messages.extend(skipped);
                    break;
                }
            }
        }

        let target = if ended { &self.end_to } else { &self.continue_to };
        Ok(StepResult::goto(update, target.clone()))
    }

    async fn execute(&self, action: &A) -> (String, bool) {
        match self.executor.execute(action).await {
            Ok(output) => (output, false),
            Err(err) => {
                warn!(action = action.name(), error = %err, "Action failed");
                (format!("Error: {err}"), true)
            }
        }
    }

    async fn learn(&self, ctx: &NodeContext, working: &State, signal: &PreferenceSignal) -> Result<()> {
        let mut messages = if signal.include_history {
            working.messages.clone()
        } else {
            Vec::new()
        };
        messages.extend(signal.messages.iter().cloned());
        self.preferences
            .update(ctx, &signal.namespace, messages)
            .await?;
        Ok(())
    }
}

fn tool_result(call: &ToolCall, content: &str, state: ReviewState, executed: bool, failed: bool) -> Message {
    let mut payload = json!({
        "action": call.name,
        "review_state": state,
        "executed": executed,
    });
    if failed {
        payload["error"] = Value::Bool(true);
    }
    Message::tool(content, &call.id).with_payload(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ReviewState::*;
        assert!(Proposed.can_transition_to(UnderReview));
        assert!(Proposed.can_transition_to(Accepted));
        assert!(!Proposed.can_transition_to(Edited));
        assert!(UnderReview.can_transition_to(Responded));
        assert!(!Accepted.can_transition_to(Ignored));
        assert!(Ignored.is_terminal());
        assert!(!UnderReview.is_terminal());
        assert!(Edited.executes());
        assert!(!Responded.executes());
    }

    #[test]
    fn test_state_after_response() {
        assert_eq!(ReviewState::after(&HumanResponse::Accept), ReviewState::Accepted);
        assert_eq!(ReviewState::after(&HumanResponse::respond("no")), ReviewState::Responded);
        assert_eq!(
            serde_json::to_value(ReviewState::UnderReview).unwrap(),
            json!("under_review")
        );
    }
}
