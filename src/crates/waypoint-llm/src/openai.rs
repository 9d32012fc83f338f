//! Client for OpenAI-compatible chat completions endpoints.
//!
//! Works against OpenAI itself and any server speaking the same protocol
//! (OpenRouter, LM Studio, vLLM, Ollama's `/v1` endpoint).
//!
//! # Example
//!
//! ```rust,ignore
//! use waypoint_llm::{LlmConfig, OpenAiClient};
//! use waypoint_core::{ChatModel, ChatRequest, Message};
//!
//! let config = LlmConfig::from_env("OPENAI_API_KEY", "https://api.openai.com/v1", "gpt-4o")?;
//! let client = OpenAiClient::new(config)?;
//!
//! let response = client.invoke(ChatRequest::new(vec![Message::user("Hello!")])).await?;
//! ```

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
use waypoint_core::{
    ChatModel, ChatRequest, ChatResponse, Message, ModelError, ToolCall, ToolChoice,
};

/// OpenAI API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: LlmConfig,
    client: Client,
}

impl OpenAiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::ConfigError(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn convert_message(&self, msg: &Message) -> OpenAiMessage {
        let tool_calls = msg
            .tool_calls
            .iter()
            .map(|call| OpenAiToolCall {
                id: call.id.clone(),
                kind: "function".to_string(),
                function: OpenAiFunctionCall {
                    name: call.name.clone(),
                    arguments: call.args.to_string(),
                },
            })
            .collect::<Vec<_>>();

        // Assistant messages that only carry tool calls are sent without content
        let content = if msg.content.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        OpenAiMessage {
            role: msg.role.to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAiRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| self.convert_message(m))
            .collect();

        let has_tools = !request.tools.is_empty();
        let tools = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();

        let tool_choice = has_tools.then(|| match &request.tool_choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Required => json!("required"),
            ToolChoice::Named(name) => json!({"type": "function", "function": {"name": name}}),
        });

        let response_format = request.output_schema.as_ref().map(|schema| {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "description": schema.description,
                    "schema": schema.schema,
                }
            })
        });

        OpenAiRequest {
            model: self.config.model.clone(),
            messages,
            tools,
            tool_choice,
            parallel_tool_calls: has_tools.then_some(request.parallel_tool_calls),
            response_format,
            temperature: request.temperature.or(self.config.temperature),
        }
    }

    fn convert_response(&self, request: &ChatRequest, response: OpenAiResponse) -> Result<ChatResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let args = if call.function.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.function.arguments).map_err(|e| {
                        LlmError::InvalidResponse(format!(
                            "arguments of tool call '{}' are not JSON: {e}",
                            call.function.name
                        ))
                    })?
                };
                Ok(ToolCall::new(call.function.name, args).with_id(call.id))
            })
            .collect::<Result<Vec<_>>>()?;

        let content = choice.message.content.unwrap_or_default();
        // Unparseable structured output is left for ChatResponse::parse to report
        let structured = request
            .output_schema
            .as_ref()
            .and_then(|_| serde_json::from_str::<Value>(&content).ok());

        let message = Message::assistant(content).with_tool_calls(tool_calls);
        Ok(ChatResponse { message, structured })
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_request(request);

        let mut req = self.client.post(self.config.completions_url()).json(&body);
        if !self.config.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout(e.to_string())
            } else {
                LlmError::HttpError(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), error_text));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        self.convert_response(request, parsed)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn invoke(&self, request: ChatRequest) -> std::result::Result<ChatResponse, ModelError> {
        debug!(
            model = %self.config.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            schema = request.schema_name().unwrap_or("none"),
            "Sending chat request"
        );
        self.send(&request).await.map_err(|err| {
            warn!(model = %self.config.model, error = %err, "Chat request failed");
            ModelError::from(err)
        })
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}
