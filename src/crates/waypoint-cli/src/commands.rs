//! Command implementations
//!
//! Each command takes its terminal streams as parameters so the same code
//! drives both the binary and the integration tests.

use crate::config::DEFAULT_CONFIG;
use crate::review::prompt_response;
use crate::session::Session;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use waypoint_agents::content::USER_ID;
use waypoint_agents::email::{EmailInput, InMemoryMailbox, MailboxEvent};
use waypoint_core::{CompiledGraph, Message, RunConfig, RunOutcome, Runtime, State, Update};

pub fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read an email from a JSON file
pub fn read_email(path: &Path) -> Result<EmailInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not an email", path.display()))
}

/// Answer every interrupt at the terminal until the thread completes
async fn drive<R: BufRead, W: Write>(
    session: &Session,
    graph: &CompiledGraph,
    thread_id: &str,
    mut outcome: RunOutcome,
    input: &mut R,
    output: &mut W,
) -> Result<State> {
    while let RunOutcome::Interrupted { interrupts, .. } = &outcome {
        let mut responses = Vec::with_capacity(interrupts.len());
        for request in interrupts {
            writeln!(output)?;
            responses.push(prompt_response(request, input, output)?);
        }
        outcome = graph.resume(thread_id, responses).await?;
        session.save().await?;
    }
    outcome
        .into_state()
        .context("thread ended without a final state")
}

fn describe(event: &MailboxEvent) -> String {
    match event {
        MailboxEvent::Sent(reply) => format!("sent reply to {}", reply.email_id),
        MailboxEvent::CalendarChecked(dates) => format!("checked calendar for {}", dates.join(", ")),
        MailboxEvent::Scheduled(meeting) => {
            format!("scheduled '{}' at {}", meeting.title, meeting.start_time)
        }
        MailboxEvent::MarkedRead(id) => format!("marked {id} as read"),
    }
}

/// Triage one email, prompting for every reviewed action
///
/// Running a suspended thread again returns its pending interrupts, so
/// passing the same `thread_id` after a restart picks up where it stopped.
pub async fn run_email<R: BufRead, W: Write>(
    session: &Session,
    runtime: Runtime,
    mailbox: InMemoryMailbox,
    email: EmailInput,
    thread_id: &str,
    input: &mut R,
    output: &mut W,
) -> Result<State> {
    let graph = session.email_graph(runtime, Arc::new(mailbox.clone()))?;
    writeln!(output, "Thread {thread_id}")?;

    let outcome = graph.run(thread_id, email.into_update()?).await?;
    session.save().await?;
    let state = drive(session, &graph, thread_id, outcome, input, output).await?;

    if let Some(classification) = state.get_str("classification_decision") {
        writeln!(output, "Classification: {classification}")?;
    }
    for event in mailbox.events() {
        writeln!(output, "Mailbox: {}", describe(&event))?;
    }
    info!(thread_id, messages = state.messages.len(), "Email handled");
    Ok(state)
}

/// Chat with the content manager until `exit` or end of input
///
/// `new` switches to a fresh thread; memories stay with the user.
pub async fn run_content<R: BufRead, W: Write>(
    session: &Session,
    runtime: Runtime,
    user: &str,
    thread_id: Option<String>,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    let graph = session.content_graph(runtime)?;
    let config = RunConfig::new().with(USER_ID, user);
    let mut thread_id = thread_id.unwrap_or_else(new_thread_id);
    writeln!(output, "Thread {thread_id}. Type 'new' for a fresh thread, 'exit' to quit.")?;

    loop {
        write!(output, "you> ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "" => continue,
            "exit" | "quit" => break,
            "new" => {
                thread_id = new_thread_id();
                writeln!(output, "Thread {thread_id}")?;
            }
            text => {
                let outcome = graph
                    .run_with_config(&thread_id, Update::from(Message::user(text)), config.clone())
                    .await?;
                session.save().await?;
                let reply = outcome
                    .state()
                    .and_then(State::last_message)
                    .map(|message| message.content.clone())
                    .unwrap_or_default();
                writeln!(output, "assistant> {reply}")?;
            }
        }
    }
    Ok(())
}

fn graph_for_inspection(session: &Session) -> Result<CompiledGraph> {
    // Snapshots are read from the checkpointer alone; any compiled graph will do
    session.content_graph(session.offline_runtime())
}

/// Print the latest snapshot of a thread; false when it does not exist
pub async fn show_state<W: Write>(session: &Session, thread_id: &str, output: &mut W) -> Result<bool> {
    let graph = graph_for_inspection(session)?;
    let Some(snapshot) = graph.get_state(thread_id).await? else {
        writeln!(output, "No thread '{thread_id}'")?;
        return Ok(false);
    };

    writeln!(output, "Thread:     {}", snapshot.thread_id)?;
    writeln!(output, "Checkpoint: {} (step {})", snapshot.checkpoint_id, snapshot.step)?;
    writeln!(output, "Saved:      {}", snapshot.created_at.to_rfc3339())?;
    let status = if snapshot.is_suspended() {
        format!("waiting on {} interrupt(s)", snapshot.interrupts.len())
    } else {
        match &snapshot.next {
            Some(next) => format!("next node {next}"),
            None => "completed".to_string(),
        }
    };
    writeln!(output, "Status:     {status}")?;
    if !snapshot.config.is_empty() {
        writeln!(output, "Config:     {}", serde_json::to_string(&snapshot.config.configurable)?)?;
    }

    for request in &snapshot.interrupts {
        writeln!(output, "  interrupt {}: {}", request.id, request.action_request.action)?;
    }
    writeln!(output, "Messages:")?;
    for message in &snapshot.state.messages {
        let calls: Vec<&str> = message.tool_calls.iter().map(|call| call.name.as_str()).collect();
        if calls.is_empty() {
            writeln!(output, "  {}: {}", message.role, message.content)?;
        } else {
            writeln!(output, "  {}: {} [calls {}]", message.role, message.content, calls.join(", "))?;
        }
    }
    if !snapshot.state.fields.is_empty() {
        writeln!(output, "Fields: {}", serde_json::to_string_pretty(&snapshot.state.fields)?)?;
    }
    Ok(true)
}

/// Drop a thread's checkpoints; false when it did not exist
pub async fn cancel<W: Write>(session: &Session, thread_id: &str, output: &mut W) -> Result<bool> {
    let existed = graph_for_inspection(session)?.cancel(thread_id).await?;
    if existed {
        writeln!(output, "Cancelled thread '{thread_id}'")?;
    } else {
        writeln!(output, "No thread '{thread_id}'")?;
    }
    Ok(existed)
}

/// Write the default configuration file; false if one exists and `force` is off
pub fn init(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(true)
}
