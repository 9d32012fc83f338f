//! State and model-output types of the email assistant

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use waypoint_core::{OutputSchema, Update};

/// State field holding the inbound email
pub const EMAIL_INPUT: &str = "email_input";
/// State field holding the triage decision
pub const CLASSIFICATION: &str = "classification_decision";

/// Inbound email as delivered by the mail source
///
/// Every field is optional; missing ones render as empty text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_thread: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl EmailInput {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.email_thread = Some(thread.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn author_or_empty(&self) -> &str {
        self.author.as_deref().unwrap_or_default()
    }

    pub fn to_or_empty(&self) -> &str {
        self.to.as_deref().unwrap_or_default()
    }

    pub fn subject_or_empty(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }

    pub fn thread_or_empty(&self) -> &str {
        self.email_thread.as_deref().unwrap_or_default()
    }

    /// Input update that starts a triage run for this email
    pub fn into_update(self) -> waypoint_core::Result<Update> {
        Update::new().field_from(EMAIL_INPUT, &self)
    }
}

/// Triage outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Not worth a response
    Ignore,
    /// Worth knowing about, no reply needed
    Notify,
    /// Needs a reply
    Respond,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Ignore => "ignore",
            Classification::Notify => "notify",
            Classification::Respond => "respond",
        })
    }
}

/// Structured answer of the triage model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSchema {
    pub reasoning: String,
    pub classification: Classification,
}

impl RouterSchema {
    pub const NAME: &'static str = "RouterSchema";

    pub fn output_schema() -> OutputSchema {
        OutputSchema::new(
            Self::NAME,
            "Analyze incoming email and route it based on its content",
            json!({
                "type": "object",
                "properties": {
                    "reasoning": {
                        "type": "string",
                        "description": "Logical reasoning behind classification"
                    },
                    "classification": {
                        "type": "string",
                        "enum": ["ignore", "respond", "notify"],
                        "description": "'ignore' for irrelevant emails, 'notify' for important information that doesn't require response, 'respond' for emails that need a response"
                    }
                },
                "required": ["reasoning", "classification"]
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_input_fields_optional() {
        let email: EmailInput = serde_json::from_value(json!({"subject": "Meeting?"})).unwrap();
        assert_eq!(email.subject_or_empty(), "Meeting?");
        assert_eq!(email.author_or_empty(), "");
        assert!(email.id.is_none());
    }

    #[test]
    fn test_router_schema_parse() {
        let router: RouterSchema =
            serde_json::from_value(json!({"reasoning": "spam", "classification": "ignore"})).unwrap();
        assert_eq!(router.classification, Classification::Ignore);
        assert!(serde_json::from_value::<RouterSchema>(json!({"reasoning": "", "classification": "maybe"})).is_err());
    }
}
