//! What a node hands back to the engine

use crate::interrupt::InterruptRequest;
use crate::state::Update;

/// Outcome of one node execution
///
/// ```rust
/// use waypoint_core::{Message, StepResult, Update, END};
///
/// // Merge a message and follow the node's edge
/// let next = StepResult::update(Update::from(Message::assistant("done")));
///
/// // Merge nothing and jump straight to the end
/// let stop = StepResult::goto(Update::new(), END);
/// assert!(stop.goto_target().is_some());
/// ```
#[derive(Debug, Clone)]
pub enum StepResult {
    /// Merge `update`, then go to `goto` or follow the node's edges
    Continue { update: Update, goto: Option<String> },

    /// Merge `update`, checkpoint, and wait for responses to `requests`
    Suspend {
        update: Update,
        requests: Vec<InterruptRequest>,
    },
}

impl StepResult {
    pub fn update(update: Update) -> Self {
        StepResult::Continue { update, goto: None }
    }

    pub fn goto(update: Update, target: impl Into<String>) -> Self {
        StepResult::Continue {
            update,
            goto: Some(target.into()),
        }
    }

    pub fn suspend(request: InterruptRequest) -> Self {
        StepResult::Suspend {
            update: Update::new(),
            requests: vec![request],
        }
    }

    /// Suspend while keeping progress made so far
    pub fn suspend_with(update: Update, requests: Vec<InterruptRequest>) -> Self {
        StepResult::Suspend { update, requests }
    }

    pub fn is_suspend(&self) -> bool {
        matches!(self, StepResult::Suspend { .. })
    }

    pub fn goto_target(&self) -> Option<&str> {
        match self {
            StepResult::Continue { goto, .. } => goto.as_deref(),
            StepResult::Suspend { .. } => None,
        }
    }

    pub fn update_ref(&self) -> &Update {
        match self {
            StepResult::Continue { update, .. } | StepResult::Suspend { update, .. } => update,
        }
    }
}

impl From<Update> for StepResult {
    fn from(update: Update) -> Self {
        StepResult::update(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::{ActionRequest, ResponseModes};
    use crate::messages::Message;
    use serde_json::json;

    #[test]
    fn test_continue_variants() {
        let plain = StepResult::from(Update::from(Message::user("hi")));
        assert!(plain.goto_target().is_none());
        assert_eq!(plain.update_ref().messages.len(), 1);

        let jump = StepResult::goto(Update::new(), "llm_call");
        assert_eq!(jump.goto_target(), Some("llm_call"));
    }

    #[test]
    fn test_suspend() {
        let request = InterruptRequest::new(
            ActionRequest::new("Question", json!({"content": "When?"})),
            ResponseModes::ignore_or_respond(),
            "question",
        );
        let result = StepResult::suspend(request);
        assert!(result.is_suspend());
        assert!(result.goto_target().is_none());
    }
}
