//! Conversation messages and the message reducer
//!
//! Every workflow state carries an ordered list of [`Message`]s. Nodes never
//! rewrite that list; they return new messages in their update and the engine
//! folds them in with [`add_messages`]:
//!
//! - a message whose `id` is already present replaces the earlier one in place
//! - any other message is appended
//!
//! Nothing is ever removed, so the message count of a thread only grows.
//!
//! ```rust
//! use waypoint_core::messages::{add_messages, Message};
//!
//! let history = vec![Message::user("Meeting?").with_id("1")];
//! let merged = add_messages(history, vec![Message::assistant("Sure").with_id("2")]);
//! assert_eq!(merged.len(), 2);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        f.write_str(name)
    }
}

/// A tool invocation proposed by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A single conversation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_id")]
    pub id: String,

    pub role: Role,

    #[serde(default)]
    pub content: String,

    /// Tool calls proposed by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Call this tool message answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Structured side data, e.g. a review outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            payload: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Result of the tool call `tool_call_id`
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// Merge `right` into `left`: replace by id, otherwise append
pub fn add_messages(left: Vec<Message>, right: Vec<Message>) -> Vec<Message> {
    let mut merged = left;
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, message)| (message.id.clone(), i))
        .collect();

    for message in right {
        match index.get(&message.id) {
            Some(&position) => merged[position] = message,
            None => {
                index.insert(message.id.clone(), merged.len());
                merged.push(message);
            }
        }
    }

    merged
}

/// Collapse consecutive system/user messages into one, joining their text
///
/// Assistant and tool messages are kept as they are since their tool
/// linkage must survive.
pub fn merge_message_runs(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        let mergeable = matches!(message.role, Role::System | Role::User);
        match merged.last_mut() {
            Some(last) if mergeable && last.role == message.role => {
                last.content.push('\n');
                last.content.push_str(&message.content);
            }
            _ => merged.push(message),
        }
    }
    merged
}

/// Position of the most recent assistant message that proposed tool calls
pub fn last_tool_call_message(messages: &[Message]) -> Option<usize> {
    messages
        .iter()
        .rposition(|message| message.is_assistant() && message.has_tool_calls())
}

/// Ids of tool calls already answered by a tool message after `from`
pub fn answered_tool_calls(messages: &[Message], from: usize) -> HashSet<String> {
    messages
        .iter()
        .skip(from + 1)
        .filter(|message| message.role == Role::Tool)
        .filter_map(|message| message.tool_call_id.clone())
        .collect()
}
