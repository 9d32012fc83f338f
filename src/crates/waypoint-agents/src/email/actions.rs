//! Tools the email assistant's model may call
//!
//! | tool                    | review                 |
//! |-------------------------|------------------------|
//! | `send_email_tool`       | accept, edit, ignore, respond |
//! | `schedule_meeting_tool` | accept, edit, ignore, respond |
//! | `Question`              | ignore, respond        |
//! | `check_calendar_tool`   | runs directly          |
//! | `Done`                  | runs directly          |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use waypoint_core::{
    GraphError, ResponseModes, Result, ReviewPolicy, ReviewableAction, ToolCall, ToolDefinition,
};

pub const SEND_EMAIL: &str = "send_email_tool";
pub const CHECK_CALENDAR: &str = "check_calendar_tool";
pub const SCHEDULE_MEETING: &str = "schedule_meeting_tool";
pub const QUESTION: &str = "Question";
pub const DONE: &str = "Done";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEmailArgs {
    /// Id of the email being answered
    pub email_id: String,
    pub response_text: String,
    /// Address the reply is sent from
    pub email_address: String,
    #[serde(default)]
    pub additional_recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckCalendarArgs {
    /// Dates as `DD-MM-YYYY`
    pub dates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMeetingArgs {
    pub attendees: Vec<String>,
    pub title: String,
    /// ISO 8601 start
    pub start_time: String,
    /// ISO 8601 end
    pub end_time: String,
    pub organizer_email: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionArgs {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoneArgs {
    #[serde(default = "default_done")]
    pub done: bool,
}

fn default_done() -> bool {
    true
}

/// A tool call of the email assistant with typed arguments
#[derive(Debug, Clone, PartialEq)]
pub enum EmailAction {
    SendEmail(SendEmailArgs),
    CheckCalendar(CheckCalendarArgs),
    ScheduleMeeting(ScheduleMeetingArgs),
    Question(QuestionArgs),
    Done(DoneArgs),
}

fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T> {
    serde_json::from_value(call.args.clone())
        .map_err(|err| GraphError::invalid_tool_arguments(&call.name, err))
}

impl EmailAction {
    pub fn is_done(&self) -> bool {
        matches!(self, EmailAction::Done(_))
    }
}

impl ReviewableAction for EmailAction {
    fn from_tool_call(call: &ToolCall) -> Result<Self> {
        match call.name.as_str() {
            SEND_EMAIL => parse_args(call).map(EmailAction::SendEmail),
            CHECK_CALENDAR => parse_args(call).map(EmailAction::CheckCalendar),
            SCHEDULE_MEETING => parse_args(call).map(EmailAction::ScheduleMeeting),
            QUESTION => parse_args(call).map(EmailAction::Question),
            DONE => parse_args(call).map(EmailAction::Done),
            other => Err(GraphError::Configuration(format!(
                "the email assistant has no tool named '{other}'"
            ))),
        }
    }

    fn name(&self) -> &str {
        match self {
            EmailAction::SendEmail(_) => SEND_EMAIL,
            EmailAction::CheckCalendar(_) => CHECK_CALENDAR,
            EmailAction::ScheduleMeeting(_) => SCHEDULE_MEETING,
            EmailAction::Question(_) => QUESTION,
            EmailAction::Done(_) => DONE,
        }
    }

    fn args(&self) -> Result<Value> {
        let args = match self {
            EmailAction::SendEmail(args) => serde_json::to_value(args),
            EmailAction::CheckCalendar(args) => serde_json::to_value(args),
            EmailAction::ScheduleMeeting(args) => serde_json::to_value(args),
            EmailAction::Question(args) => serde_json::to_value(args),
            EmailAction::Done(args) => serde_json::to_value(args),
        };
        Ok(args?)
    }

    fn policy(&self) -> ReviewPolicy {
        match self {
            EmailAction::SendEmail(_) | EmailAction::ScheduleMeeting(_) => {
                ReviewPolicy::Review(ResponseModes::all())
            }
            EmailAction::Question(_) => ReviewPolicy::Review(ResponseModes::ignore_or_respond()),
            EmailAction::CheckCalendar(_) | EmailAction::Done(_) => ReviewPolicy::AutoExecute,
        }
    }
}

/// Tool definitions offered to the model
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(SEND_EMAIL, "Send a reply to an email thread").with_parameters(json!({
            "type": "object",
            "properties": {
                "email_id": {"type": "string", "description": "Id of the email to reply to"},
                "response_text": {"type": "string", "description": "Body of the reply"},
                "email_address": {"type": "string", "description": "Address the reply is sent from"},
                "additional_recipients": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["email_id", "response_text", "email_address"]
        })),
        ToolDefinition::new(CHECK_CALENDAR, "Check calendar availability for specific dates")
            .with_parameters(json!({
                "type": "object",
                "properties": {
                    "dates": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Dates to check, formatted DD-MM-YYYY"
                    }
                },
                "required": ["dates"]
            })),
        ToolDefinition::new(SCHEDULE_MEETING, "Schedule a meeting and send invites").with_parameters(json!({
            "type": "object",
            "properties": {
                "attendees": {"type": "array", "items": {"type": "string"}},
                "title": {"type": "string"},
                "start_time": {"type": "string", "description": "ISO 8601 start time"},
                "end_time": {"type": "string", "description": "ISO 8601 end time"},
                "organizer_email": {"type": "string"},
                "timezone": {"type": "string", "default": "UTC"}
            },
            "required": ["attendees", "title", "start_time", "end_time", "organizer_email"]
        })),
        ToolDefinition::new(QUESTION, "Question to ask user").with_parameters(json!({
            "type": "object",
            "properties": {"content": {"type": "string"}},
            "required": ["content"]
        })),
        ToolDefinition::new(DONE, "E-mail has been sent").with_parameters(json!({
            "type": "object",
            "properties": {"done": {"type": "boolean"}},
            "required": ["done"]
        })),
    ]
}

/// Tool list rendered for the system prompt
pub fn tools_prompt() -> String {
    tool_definitions()
        .iter()
        .enumerate()
        .map(|(i, tool)| format!("{}. {} - {}", i + 1, tool.name, tool.description))
        .collect::<Vec<_>>()
        .join("\n")
}
