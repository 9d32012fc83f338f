//! Email triage assistant
//!
//! Classifies each inbound email, drafts replies and meeting invites with
//! the model, and routes every outbound action past a human reviewer.

pub mod actions;
pub mod format;
pub mod graph;
pub mod mailbox;
pub mod prompts;
pub mod schemas;

pub use actions::{
    tool_definitions, CheckCalendarArgs, DoneArgs, EmailAction, QuestionArgs, ScheduleMeetingArgs,
    SendEmailArgs,
};
pub use graph::{preferences_namespace, AssistantProfile, EmailAssistant, EmailReviewHandler};
pub use mailbox::{EmailActionExecutor, InMemoryMailbox, MailBackend, MailError, MailOperation, MailboxEvent};
pub use schemas::{Classification, EmailInput, RouterSchema};
