//! Deterministic [`ChatModel`]s for tests
//!
//! [`ScriptedModel`] replays a fixed sequence of answers and records every
//! request it receives; [`FnModel`] answers through a closure.

use crate::llm::{ChatModel, ChatRequest, ChatResponse, ModelError};
use crate::messages::{Message, ToolCall};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
struct Script {
    answers: VecDeque<Result<ChatResponse, ModelError>>,
    requests: Vec<ChatRequest>,
}

/// Model replaying queued answers in order
///
/// Clones share the script, so a test can keep a handle for assertions after
/// moving the model into a runtime. Once the script runs out every call fails
/// with [`ModelError::Permanent`].
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<Script>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, response: ChatResponse) -> Self {
        self.script.lock().answers.push_back(Ok(response));
        self
    }

    pub fn then_message(self, message: Message) -> Self {
        self.then(ChatResponse::new(message))
    }

    pub fn then_structured(self, value: Value) -> Self {
        self.then(ChatResponse::structured(value))
    }

    /// Assistant message proposing `calls`
    pub fn then_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.then_message(Message::assistant("").with_tool_calls(calls))
    }

    pub fn then_error(self, error: ModelError) -> Self {
        self.script.lock().answers.push_back(Err(error));
        self
    }

    pub fn call_count(&self) -> usize {
        self.script.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.script.lock().requests.clone()
    }

    /// Number of requests that asked for the named output schema
    pub fn requests_with_schema(&self, name: &str) -> usize {
        self.script
            .lock()
            .requests
            .iter()
            .filter(|request| request.schema_name() == Some(name))
            .count()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().answers.len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        let mut script = self.script.lock();
        script.requests.push(request);
        script
            .answers
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Permanent("scripted model has no more answers".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

type Responder = dyn Fn(&ChatRequest) -> Result<ChatResponse, ModelError> + Send + Sync;

/// Model answering through a closure
#[derive(Clone)]
pub struct FnModel {
    responder: Arc<Responder>,
}

impl FnModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<ChatResponse, ModelError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
        }
    }
}

#[async_trait]
impl ChatModel for FnModel {
    async fn invoke(&self, request: ChatRequest) -> Result<ChatResponse, ModelError> {
        (self.responder)(&request)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OutputSchema;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_replays_in_order() {
        let model = ScriptedModel::new()
            .then_message(Message::assistant("one"))
            .then_structured(json!({"n": 2}));

        let first = model.invoke(ChatRequest::default()).await.unwrap();
        let second = model
            .invoke(ChatRequest::default().with_output_schema(OutputSchema::new("N", "", json!({}))))
            .await
            .unwrap();

        assert_eq!(first.message.content, "one");
        assert_eq!(second.structured, Some(json!({"n": 2})));
        assert_eq!(model.requests_with_schema("N"), 1);
        assert!(matches!(
            model.invoke(ChatRequest::default()).await,
            Err(ModelError::Permanent(_))
        ));
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fn_model_sees_request() {
        let model = FnModel::new(|request| {
            Ok(ChatResponse::new(Message::assistant(format!(
                "{} messages",
                request.messages.len()
            ))))
        });
        let response = model
            .invoke(ChatRequest::new(vec![Message::user("a"), Message::user("b")]))
            .await
            .unwrap();
        assert_eq!(response.message.content, "2 messages");
    }
}
