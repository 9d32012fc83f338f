//! Tool definitions advertised to the model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the model may call
///
/// ```rust
/// use serde_json::json;
/// use waypoint_core::llm::ToolDefinition;
///
/// let tool = ToolDefinition::new("check_calendar_tool", "Check calendar availability")
///     .with_parameters(json!({
///         "type": "object",
///         "properties": {"dates": {"type": "array", "items": {"type": "string"}}},
///         "required": ["dates"]
///     }));
/// assert_eq!(tool.name, "check_calendar_tool");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name; tool calls are matched on it
    pub name: String,

    /// What the tool does and when to use it
    pub description: String,

    /// JSON Schema of the arguments object
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}
