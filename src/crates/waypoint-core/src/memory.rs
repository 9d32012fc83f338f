//! Long-term preference memory
//!
//! Preferences are singleton text records stored under the fixed key
//! [`PREFERENCES_KEY`] in a caller-chosen namespace, e.g.
//! `("email_assistant", "response_preferences")`.
//!
//! - [`get_memory`] reads them, seeding the default on first use
//! - [`PreferenceUpdater`] asks the model to fold human feedback into them

use crate::error::Result;
use crate::llm::{ChatRequest, OutputSchema};
use crate::messages::{Message, Role};
use crate::runtime::NodeContext;
use crate::store::{Namespace, Store};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

/// Key of the singleton preference record in each namespace
pub const PREFERENCES_KEY: &str = "user_preferences";

const DEFAULT_UPDATE_INSTRUCTIONS: &str = "\
You maintain a user's preference profile for the {namespace} memory.

Current profile:
<profile>
{current_profile}
</profile>

Update the profile from the feedback in the conversation below. Keep every
existing preference that the feedback does not contradict, make targeted
additions or corrections only, and never rewrite the profile from scratch.
Return the complete updated profile as plain text.";

/// Read preferences, storing `default` when none exist yet
pub async fn get_memory(store: &dyn Store, namespace: &Namespace, default: &str) -> Result<String> {
    let value = store
        .get_or_default(namespace, PREFERENCES_KEY, Value::String(default.to_string()))
        .await?;
    Ok(match value {
        Value::String(text) => text,
        other => other.to_string(),
    })
}

/// Structured answer of a preference update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Reasoning about which preferences change
    pub chain_of_thought: String,
    /// The full updated preference text
    pub user_preferences: String,
}

impl UserPreferences {
    pub const SCHEMA_NAME: &'static str = "UserPreferences";

    pub fn output_schema() -> OutputSchema {
        OutputSchema::new(
            Self::SCHEMA_NAME,
            "Updated user preferences",
            json!({
                "type": "object",
                "properties": {
                    "chain_of_thought": {"type": "string", "description": "Reasoning about which preferences need to be added or updated"},
                    "user_preferences": {"type": "string", "description": "Updated user preferences"}
                },
                "required": ["chain_of_thought", "user_preferences"]
            }),
        )
    }
}

/// Result of a [`PreferenceUpdater::update`] call
#[derive(Debug, Clone, PartialEq)]
pub enum PreferenceUpdate {
    /// New text stored
    Updated(String),
    /// Model unavailable or unusable; previous text kept
    Unchanged,
    /// Nothing stored in the namespace yet; nothing to refine
    Missing,
}

/// Folds feedback into stored preferences through the model
#[derive(Debug, Clone)]
pub struct PreferenceUpdater {
    instructions: String,
}

impl Default for PreferenceUpdater {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_INSTRUCTIONS)
    }
}

impl PreferenceUpdater {
    /// `instructions` may use `{current_profile}` and `{namespace}`
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
        }
    }

    #[tracing::instrument(skip(self, ctx, messages), fields(namespace = %namespace))]
    pub async fn update(
        &self,
        ctx: &NodeContext,
        namespace: &Namespace,
        messages: Vec<Message>,
    ) -> Result<PreferenceUpdate> {
        let Some(item) = ctx.store().get(namespace, PREFERENCES_KEY).await? else {
            info!("No stored preferences, skipping update");
            return Ok(PreferenceUpdate::Missing);
        };
        let current = match &item.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        let system = self
            .instructions
            .replace("{current_profile}", &current)
            .replace("{namespace}", &namespace.to_string());
        let request = ChatRequest::new(vec![
            Message::system(system),
            Message::user(transcript(&messages)),
        ])
        .with_output_schema(UserPreferences::output_schema())
        .with_temperature(0.0);

        let Some(response) = ctx.invoke_model(request).await? else {
            return Ok(PreferenceUpdate::Unchanged);
        };
        let preferences: UserPreferences = match response.parse() {
            Ok(preferences) => preferences,
            Err(err) => {
                warn!(error = %err, "Unusable preference update, keeping current preferences");
                return Ok(PreferenceUpdate::Unchanged);
            }
        };

        ctx.store()
            .put(
                namespace,
                PREFERENCES_KEY,
                Value::String(preferences.user_preferences.clone()),
            )
            .await?;
        info!("Preferences updated");
        Ok(PreferenceUpdate::Updated(preferences.user_preferences))
    }
}

/// Flatten messages into a plain-text transcript
///
/// Tool calls are rendered inline so the transcript is valid input for any
/// provider regardless of tool-message pairing rules.
pub fn transcript(messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len());
    for message in messages.iter().filter(|m| m.role != Role::System) {
        let mut line = format!("{}: {}", message.role, message.content);
        for call in &message.tool_calls {
            line.push_str(&format!("\n  [tool call {} {}]", call.name, call.args));
        }
        lines.push(line);
    }
    lines.join("\n")
}
