//! Request and response types for [`ChatModel`](super::ChatModel)

use super::tools::ToolDefinition;
use super::traits::ModelError;
use crate::messages::Message;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether the model may, must, or must specifically call a tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    Required,
    Named(String),
}

/// JSON Schema the model's answer must follow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

/// One model invocation
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub parallel_tool_calls: bool,
    pub output_schema: Option<OutputSchema>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    /// Ask for a structured answer following `schema`
    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Name of the requested output schema, if any
    pub fn schema_name(&self) -> Option<&str> {
        self.output_schema.as_ref().map(|schema| schema.name.as_str())
    }
}

/// Model answer
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    /// Assistant message, possibly carrying tool calls
    pub message: Message,

    /// Parsed structured output when an output schema was requested
    pub structured: Option<Value>,
}

impl ChatResponse {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            structured: None,
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            message: Message::assistant(value.to_string()),
            structured: Some(value),
        }
    }

    /// Decode the structured output, falling back to the message text as JSON
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ModelError> {
        let value = match &self.structured {
            Some(value) => value.clone(),
            None => serde_json::from_str(&self.message.content).map_err(|err| {
                ModelError::InvalidResponse(format!("expected JSON output: {err}"))
            })?,
        };
        serde_json::from_value(value)
            .map_err(|err| ModelError::InvalidResponse(format!("output does not match schema: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Routing {
        classification: String,
    }

    #[test]
    fn test_parse_structured() {
        let response = ChatResponse::structured(json!({"classification": "ignore"}));
        let routing: Routing = response.parse().unwrap();
        assert_eq!(routing.classification, "ignore");
    }

    #[test]
    fn test_parse_from_content() {
        let response = ChatResponse::new(Message::assistant(r#"{"classification": "notify"}"#));
        let routing: Routing = response.parse().unwrap();
        assert_eq!(routing.classification, "notify");
    }

    #[test]
    fn test_parse_mismatch_is_invalid_response() {
        let response = ChatResponse::structured(json!({"other": 1}));
        let err = response.parse::<Routing>().unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }
}
