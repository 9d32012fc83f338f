//! Mail and calendar backends
//!
//! [`MailBackend`] is the seam to a real mail provider. [`InMemoryMailbox`]
//! records every operation and is what tests and the CLI use.

use super::actions::{EmailAction, ScheduleMeetingArgs, SendEmailArgs};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use waypoint_core::{ActionError, ActionExecutor};

/// Result type for mail operations
pub type Result<T> = std::result::Result<T, MailError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MailError {
    #[error("Unknown email '{0}'")]
    UnknownEmail(String),

    #[error("Mail provider unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected by mail provider: {0}")]
    Rejected(String),
}

/// Operations a mail provider supports
#[async_trait]
pub trait MailBackend: Send + Sync {
    /// Send a reply; returns a confirmation for the model
    async fn send_reply(&self, reply: &SendEmailArgs) -> Result<String>;

    /// Describe availability on each date
    async fn check_calendar(&self, dates: &[String]) -> Result<String>;

    async fn schedule_meeting(&self, meeting: &ScheduleMeetingArgs) -> Result<String>;

    async fn mark_as_read(&self, email_id: &str) -> Result<()>;
}

/// Operation kinds, for injecting failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailOperation {
    Send,
    CheckCalendar,
    Schedule,
    MarkRead,
}

/// Something the mailbox did
#[derive(Debug, Clone, PartialEq)]
pub enum MailboxEvent {
    Sent(SendEmailArgs),
    CalendarChecked(Vec<String>),
    Scheduled(ScheduleMeetingArgs),
    MarkedRead(String),
}

#[derive(Default)]
struct MailboxState {
    events: Vec<MailboxEvent>,
    busy: BTreeMap<String, Vec<String>>,
    failing: HashSet<MailOperation>,
}

/// Mailbox kept in memory
#[derive(Clone, Default)]
pub struct InMemoryMailbox {
    state: Arc<Mutex<MailboxState>>,
}

impl InMemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a slot on `date` (`DD-MM-YYYY`) as taken
    pub fn with_busy_slot(self, date: impl Into<String>, slot: impl Into<String>) -> Self {
        self.state
            .lock()
            .busy
            .entry(date.into())
            .or_default()
            .push(slot.into());
        self
    }

    /// Make every call of `operation` fail
    pub fn failing(self, operation: MailOperation) -> Self {
        self.state.lock().failing.insert(operation);
        self
    }

    pub fn events(&self) -> Vec<MailboxEvent> {
        self.state.lock().events.clone()
    }

    pub fn sent(&self) -> Vec<SendEmailArgs> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                MailboxEvent::Sent(reply) => Some(reply.clone()),
                _ => None,
            })
            .collect()
    }

    fn check(&self, operation: MailOperation) -> Result<()> {
        if self.state.lock().failing.contains(&operation) {
            return Err(MailError::Unavailable(format!("{operation:?} is failing")));
        }
        Ok(())
    }

    fn record(&self, event: MailboxEvent) {
        self.state.lock().events.push(event);
    }
}

#[async_trait]
impl MailBackend for InMemoryMailbox {
    async fn send_reply(&self, reply: &SendEmailArgs) -> Result<String> {
        self.check(MailOperation::Send)?;
        if reply.email_id.trim().is_empty() {
            return Err(MailError::UnknownEmail(reply.email_id.clone()));
        }
        self.record(MailboxEvent::Sent(reply.clone()));
        info!(email_id = %reply.email_id, "Reply sent");

        let mut confirmation = format!("Email reply sent successfully to thread {}", reply.email_id);
        if !reply.additional_recipients.is_empty() {
            confirmation.push_str(&format!(
                " (also sent to {})",
                reply.additional_recipients.join(", ")
            ));
        }
        Ok(confirmation)
    }

    async fn check_calendar(&self, dates: &[String]) -> Result<String> {
        self.check(MailOperation::CheckCalendar)?;
        self.record(MailboxEvent::CalendarChecked(dates.to_vec()));

        let state = self.state.lock();
        let lines: Vec<String> = dates
            .iter()
            .map(|date| match state.busy.get(date) {
                Some(slots) if !slots.is_empty() => {
                    format!("{date}: busy during {}", slots.join(", "))
                }
                _ => format!("{date}: available all day"),
            })
            .collect();
        Ok(format!("Calendar availability:\n{}", lines.join("\n")))
    }

    async fn schedule_meeting(&self, meeting: &ScheduleMeetingArgs) -> Result<String> {
        self.check(MailOperation::Schedule)?;
        if meeting.attendees.is_empty() {
            return Err(MailError::Rejected("a meeting needs at least one attendee".into()));
        }
        self.record(MailboxEvent::Scheduled(meeting.clone()));
        Ok(format!(
            "Meeting '{}' scheduled from {} to {} ({}) with {} attendee(s)",
            meeting.title,
            meeting.start_time,
            meeting.end_time,
            meeting.timezone,
            meeting.attendees.len()
        ))
    }

    async fn mark_as_read(&self, email_id: &str) -> Result<()> {
        self.check(MailOperation::MarkRead)?;
        self.record(MailboxEvent::MarkedRead(email_id.to_string()));
        Ok(())
    }
}

/// Executes reviewed email actions against a [`MailBackend`]
#[derive(Clone)]
pub struct EmailActionExecutor {
    backend: Arc<dyn MailBackend>,
}

impl EmailActionExecutor {
    pub fn new(backend: Arc<dyn MailBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ActionExecutor<EmailAction> for EmailActionExecutor {
    async fn execute(&self, action: &EmailAction) -> std::result::Result<String, ActionError> {
        let outcome = match action {
            EmailAction::SendEmail(reply) => self.backend.send_reply(reply).await,
            EmailAction::CheckCalendar(args) => self.backend.check_calendar(&args.dates).await,
            EmailAction::ScheduleMeeting(meeting) => self.backend.schedule_meeting(meeting).await,
            EmailAction::Done(_) => Ok("Email handled.".to_string()),
            EmailAction::Question(_) => {
                return Err(ActionError::new("questions are answered by the user"));
            }
        };
        outcome.map_err(|err| ActionError::new(err.to_string()))
    }
}
