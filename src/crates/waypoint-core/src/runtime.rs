//! Injected dependencies and per-step context
//!
//! A [`Runtime`] bundles the long-lived collaborators of a compiled graph
//! (memory store, model, retry policy). Every node execution receives a
//! [`NodeContext`] that exposes the runtime together with the step's
//! coordinates (thread, node, step) and any human responses delivered by
//! `resume`.

use crate::error::{GraphError, Result};
use crate::interrupt::HumanResponse;
use crate::llm::{ChatModel, ChatRequest, ChatResponse};
use crate::retry::{invoke_with_retry, RetryPolicy};
use crate::store::{InMemoryStore, Store};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// Long-lived collaborators shared by every node of a graph
#[derive(Clone)]
pub struct Runtime {
    store: Arc<dyn Store>,
    model: Option<Arc<dyn ChatModel>>,
    retry: RetryPolicy,
}

impl Runtime {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            model: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn model(&self) -> Option<&Arc<dyn ChatModel>> {
        self.model.as_ref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }
}

/// Per-run values such as the user a conversation belongs to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub configurable: Map<String, Value>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configurable.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.configurable.is_empty()
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.configurable.get(key).and_then(Value::as_str)
    }
}

/// Responses delivered to the node being re-entered
pub(crate) type ResponseQueue = Arc<Mutex<VecDeque<HumanResponse>>>;

/// Everything a node may use besides the state
#[derive(Clone)]
pub struct NodeContext {
    thread_id: String,
    node: String,
    step: u64,
    runtime: Runtime,
    config: RunConfig,
    responses: ResponseQueue,
}

impl NodeContext {
    pub(crate) fn new(
        thread_id: impl Into<String>,
        node: impl Into<String>,
        step: u64,
        runtime: Runtime,
        config: RunConfig,
        responses: ResponseQueue,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            node: node.into(),
            step,
            runtime,
            config,
            responses,
        }
    }

    /// Context outside any engine run, for calling node logic directly
    pub fn detached(thread_id: impl Into<String>, runtime: Runtime) -> Self {
        Self::new(
            thread_id,
            "detached",
            0,
            runtime,
            RunConfig::default(),
            ResponseQueue::default(),
        )
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Queue responses as if delivered by `resume`
    pub fn with_responses(self, responses: impl IntoIterator<Item = HumanResponse>) -> Self {
        self.responses.lock().extend(responses);
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn store(&self) -> &dyn Store {
        self.runtime.store.as_ref()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// A configurable value the run cannot do without
    pub fn require_config(&self, key: &str) -> Result<&str> {
        self.config.get_str(key).ok_or_else(|| {
            GraphError::InvalidInput(format!("run config is missing '{key}'"))
        })
    }

    /// Next unconsumed human response, if any
    pub fn take_response(&self) -> Option<HumanResponse> {
        self.responses.lock().pop_front()
    }

    pub fn pending_responses(&self) -> usize {
        self.responses.lock().len()
    }

    /// Invoke the runtime model with retries
    ///
    /// `Ok(None)` means the model stayed unavailable after retrying; the
    /// caller applies its fallback. A missing model is a configuration error.
    pub async fn invoke_model(&self, request: ChatRequest) -> Result<Option<ChatResponse>> {
        let model = self.runtime.model.as_ref().ok_or_else(|| {
            GraphError::Configuration(format!("node '{}' needs a model but none is configured", self.node))
        })?;
        let response = invoke_with_retry(model.as_ref(), request, &self.runtime.retry).await?;
        if response.is_none() {
            tracing::warn!(
                thread_id = %self.thread_id,
                node = %self.node,
                "Model unavailable after retries, using fallback"
            );
        }
        Ok(response)
    }
}
