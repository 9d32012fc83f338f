//! Human-in-the-loop interrupt requests and responses
//!
//! A node that needs a decision returns
//! [`StepResult::Suspend`](crate::StepResult::Suspend) with one or more
//! [`InterruptRequest`]s. The engine checkpoints the thread and hands the
//! requests to the caller, who later resumes the thread with one
//! [`HumanResponse`] per request. Each request states which response types
//! it accepts through [`ResponseModes`]; anything else is rejected before the
//! thread is touched.
//!
//! Wire format of a response:
//!
//! ```json
//! {"type": "accept"}
//! {"type": "ignore"}
//! {"type": "response", "args": "Please keep it short"}
//! {"type": "edit", "args": {"action": "send_email_tool", "args": {"response_text": "..."}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The action a human is asked to look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub args: Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}

/// Which responses an interrupt accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseModes {
    #[serde(default)]
    pub allow_ignore: bool,
    #[serde(default)]
    pub allow_respond: bool,
    #[serde(default)]
    pub allow_edit: bool,
    #[serde(default)]
    pub allow_accept: bool,
}

impl ResponseModes {
    /// Accept, edit, ignore and respond
    pub const fn all() -> Self {
        Self {
            allow_ignore: true,
            allow_respond: true,
            allow_edit: true,
            allow_accept: true,
        }
    }

    /// Only ignore or free-text response
    pub const fn ignore_or_respond() -> Self {
        Self {
            allow_ignore: true,
            allow_respond: true,
            allow_edit: false,
            allow_accept: false,
        }
    }

    pub fn permits(&self, response: &HumanResponse) -> bool {
        match response {
            HumanResponse::Accept => self.allow_accept,
            HumanResponse::Edit(_) => self.allow_edit,
            HumanResponse::Ignore => self.allow_ignore,
            HumanResponse::Response(_) => self.allow_respond,
        }
    }
}

/// A suspension point waiting for one external decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub id: String,
    pub action_request: ActionRequest,
    pub config: ResponseModes,
    #[serde(default)]
    pub description: String,
}

impl InterruptRequest {
    pub fn new(
        action_request: ActionRequest,
        config: ResponseModes,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action_request,
            config,
            description: description.into(),
        }
    }
}

/// The human's decision on an interrupt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "lowercase")]
pub enum HumanResponse {
    /// Proceed as proposed
    Accept,
    /// Proceed with replacement arguments
    Edit(ActionRequest),
    /// Drop the action
    Ignore,
    /// Do not proceed; give feedback instead
    Response(String),
}

impl HumanResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            HumanResponse::Accept => "accept",
            HumanResponse::Edit(_) => "edit",
            HumanResponse::Ignore => "ignore",
            HumanResponse::Response(_) => "response",
        }
    }

    pub fn edit(action: impl Into<String>, args: Value) -> Self {
        HumanResponse::Edit(ActionRequest::new(action, args))
    }

    pub fn respond(text: impl Into<String>) -> Self {
        HumanResponse::Response(text.into())
    }
}

impl fmt::Display for HumanResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_format() {
        let edit: HumanResponse = serde_json::from_value(json!({
            "type": "edit",
            "args": {"action": "send_email_tool", "args": {"response_text": "hi"}}
        }))
        .unwrap();
        assert_eq!(
            edit,
            HumanResponse::edit("send_email_tool", json!({"response_text": "hi"}))
        );

        let accept: HumanResponse = serde_json::from_value(json!({"type": "accept"})).unwrap();
        assert_eq!(accept, HumanResponse::Accept);

        let value = serde_json::to_value(HumanResponse::respond("no")).unwrap();
        assert_eq!(value, json!({"type": "response", "args": "no"}));
    }

    #[test]
    fn test_permits() {
        let modes = ResponseModes::ignore_or_respond();
        assert!(modes.permits(&HumanResponse::Ignore));
        assert!(modes.permits(&HumanResponse::respond("x")));
        assert!(!modes.permits(&HumanResponse::Accept));
        assert!(!modes.permits(&HumanResponse::edit("a", json!({}))));
        assert!(ResponseModes::all().permits(&HumanResponse::Accept));
    }
}
