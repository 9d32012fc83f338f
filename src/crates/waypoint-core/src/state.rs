//! Workflow state, incremental updates and per-field reducers
//!
//! A [`State`] is the shared record every node of a graph reads: the message
//! history plus free-form run fields. Nodes return an [`Update`], never a new
//! state; the engine merges it through the graph's [`StateSchema`]:
//!
//! - `messages` always merge with [`add_messages`](crate::messages::add_messages)
//! - other fields use the [`Reducer`] registered for them, defaulting to
//!   [`Reducer::Overwrite`]
//!
//! ```rust
//! use serde_json::json;
//! use waypoint_core::{Message, Reducer, State, StateSchema, Update};
//!
//! let schema = StateSchema::new().field("notes", Reducer::Append);
//! let mut state = State::new();
//! schema.apply(&mut state, Update::new().field("notes", json!("a"))).unwrap();
//! schema.apply(&mut state, Update::new().field("notes", json!(["b"])).message(Message::user("hi"))).unwrap();
//! assert_eq!(state.get("notes"), Some(&json!(["a", "b"])));
//! assert_eq!(state.messages.len(), 1);
//! ```

use crate::error::{GraphError, Result};
use crate::messages::{add_messages, Message};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Custom merge function: `(current, update) -> merged`
pub type ReducerFn = Arc<dyn Fn(Option<Value>, Value) -> Result<Value> + Send + Sync>;

/// How a field folds in updates
#[derive(Clone, Default)]
pub enum Reducer {
    /// Last write wins
    #[default]
    Overwrite,
    /// Extend a list; a non-list update is pushed as one element
    Append,
    /// Custom function
    Custom(ReducerFn),
}

impl std::fmt::Debug for Reducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reducer::Overwrite => write!(f, "Overwrite"),
            Reducer::Append => write!(f, "Append"),
            Reducer::Custom(_) => write!(f, "Custom(<fn>)"),
        }
    }
}

impl Reducer {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Option<Value>, Value) -> Result<Value> + Send + Sync + 'static,
    {
        Reducer::Custom(Arc::new(f))
    }

    pub fn apply(&self, current: Option<Value>, update: Value) -> Result<Value> {
        match self {
            Reducer::Overwrite => Ok(update),
            Reducer::Append => {
                let mut items = match current {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![other],
                };
                match update {
                    Value::Array(more) => items.extend(more),
                    single => items.push(single),
                }
                Ok(Value::Array(items))
            }
            Reducer::Custom(f) => f(current, update),
        }
    }
}

/// Per-field merge rules for a graph's state
#[derive(Debug, Clone, Default)]
pub struct StateSchema {
    reducers: HashMap<String, Reducer>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the reducer for `name`
    pub fn field(mut self, name: impl Into<String>, reducer: Reducer) -> Self {
        self.reducers.insert(name.into(), reducer);
        self
    }

    pub fn reducer_for(&self, name: &str) -> &Reducer {
        const OVERWRITE: &Reducer = &Reducer::Overwrite;
        self.reducers.get(name).unwrap_or(OVERWRITE)
    }

    /// Merge an update into the state
    ///
    /// All reducers run before anything is written; if one fails the state
    /// is left as it was.
    pub fn apply(&self, state: &mut State, update: Update) -> Result<()> {
        let mut merged = Vec::with_capacity(update.fields.len());
        for (name, value) in update.fields {
            let current = state.fields.get(&name).cloned();
            let value = self.reducer_for(&name).apply(current, value)?;
            merged.push((name, value));
        }

        if !update.messages.is_empty() {
            let current = std::mem::take(&mut state.messages);
            state.messages = add_messages(current, update.messages);
        }
        state.fields.extend(merged);
        Ok(())
    }
}

/// Shared state of one thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a checkpointed state
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(GraphError::InvalidInput(
                "state must be a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Decode a field, `None` when absent or null
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        }
    }

    /// Decode a field that must be present
    pub fn require<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        self.get_as(field)?
            .ok_or_else(|| GraphError::InvalidInput(format!("state field '{field}' is missing")))
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Incremental change returned by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Set a field from any serializable value
    pub fn field_from<T: Serialize>(self, name: impl Into<String>, value: &T) -> Result<Self> {
        Ok(self.field(name, serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.fields.is_empty()
    }

    /// Fold another update into this one, later messages win by id
    pub fn extend(&mut self, other: Update) {
        let current = std::mem::take(&mut self.messages);
        self.messages = add_messages(current, other.messages);
        self.fields.extend(other.fields);
    }
}

impl From<Message> for Update {
    fn from(message: Message) -> Self {
        Update::new().message(message)
    }
}
