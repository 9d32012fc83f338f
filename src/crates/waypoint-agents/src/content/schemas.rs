//! Memory records and the routing tool of the content manager

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use waypoint_core::{GraphError, RecordSchema, Result, ToolCall, ToolDefinition};

/// Tool the model calls to ask for a memory update
pub const UPDATE_MEMORY: &str = "UpdateMemory";

/// The user's profile; a singleton record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub preferred_platforms: Vec<String>,
}

impl Profile {
    pub fn record_schema() -> RecordSchema {
        RecordSchema::new(
            "Profile",
            "The user's profile information.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": ["string", "null"], "description": "Full name of the user"},
                    "location": {"type": ["string", "null"], "description": "Geographical location of the user"},
                    "target_audience": {"type": ["string", "null"], "description": "Intended audience for the user's content"},
                    "preferred_platforms": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Platforms where the user prefers to share content"
                    }
                }
            }),
        )
        .singleton()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Idea,
    Draft,
    Review,
    Posted,
}

/// One planned or ongoing piece of content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Publishing date and time, ISO 8601
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default)]
    pub status: ContentStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea: Option<String>,
}

impl ContentItem {
    pub fn record_schema() -> RecordSchema {
        RecordSchema::new(
            "ContentCalendar",
            "A single entry representing a planned or ongoing content item in the calendar.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Title or main subject of the content piece"},
                    "platform": {"type": ["string", "null"], "description": "Platform where this content will be published"},
                    "deadline": {"type": ["string", "null"], "description": "Scheduled publishing date and time, ISO 8601"},
                    "status": {"type": "string", "enum": ["idea", "draft", "review", "posted"]},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "idea": {"type": ["string", "null"], "description": "Brief summary or concept behind the content"}
                },
                "required": ["title"]
            }),
        )
    }
}

/// Which memory an `UpdateMemory` call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    User,
    ContentCalendar,
    Guidelines,
}

impl UpdateType {
    /// Target of an `UpdateMemory` call; anything else is a configuration error
    pub fn from_tool_call(call: &ToolCall) -> Result<Self> {
        if call.name != UPDATE_MEMORY {
            return Err(GraphError::Configuration(format!(
                "the content manager has no tool named '{}'",
                call.name
            )));
        }
        let update_type = call.args.get("update_type").cloned().unwrap_or_default();
        serde_json::from_value(update_type.clone()).map_err(|_| {
            GraphError::Configuration(format!("unknown update type {update_type}"))
        })
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UpdateType::User => "user",
            UpdateType::ContentCalendar => "content_calendar",
            UpdateType::Guidelines => "guidelines",
        })
    }
}

pub fn update_memory_tool() -> ToolDefinition {
    ToolDefinition::new(UPDATE_MEMORY, "Decision on what memory type to update").with_parameters(json!({
        "type": "object",
        "properties": {
            "update_type": {"type": "string", "enum": ["user", "content_calendar", "guidelines"]}
        },
        "required": ["update_type"]
    }))
}
