//! Markdown rendering of emails and proposed actions for reviewers

use super::actions::EmailAction;
use super::schemas::EmailInput;
use regex::Regex;
use std::sync::LazyLock;

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*){2,}").unwrap());
static TRAILING_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());

/// Trim trailing whitespace and collapse runs of blank lines
pub fn clean_thread(thread: &str) -> String {
    let trimmed = TRAILING_SPACE.replace_all(thread.trim(), "");
    BLANK_RUNS.replace_all(&trimmed, "\n\n").into_owned()
}

/// Email as markdown, for prompts and review descriptions
pub fn email_markdown(email: &EmailInput) -> String {
    let mut text = format!(
        "## Email: {}\n\n**From**: {}\n**To**: {}\n",
        email.subject_or_empty(),
        email.author_or_empty(),
        email.to_or_empty(),
    );
    if let Some(id) = &email.id {
        text.push_str(&format!("**ID**: {id}\n"));
    }
    text.push_str(&format!("\n{}\n\n---", clean_thread(email.thread_or_empty())));
    text
}

/// Proposed action as markdown
pub fn action_markdown(action: &EmailAction) -> String {
    match action {
        EmailAction::SendEmail(reply) => {
            let mut text = format!("# Email Draft\n\n**Reply to**: {}\n", reply.email_id);
            if !reply.additional_recipients.is_empty() {
                text.push_str(&format!("**Cc**: {}\n", reply.additional_recipients.join(", ")));
            }
            text.push_str(&format!("\n{}", reply.response_text));
            text
        }
        EmailAction::ScheduleMeeting(meeting) => format!(
            "# Calendar Invite\n\n**Meeting**: {}\n**Attendees**: {}\n**Start**: {}\n**End**: {}\n**Timezone**: {}",
            meeting.title,
            meeting.attendees.join(", "),
            meeting.start_time,
            meeting.end_time,
            meeting.timezone
        ),
        EmailAction::Question(question) => format!("# Question for User\n\n{}", question.content),
        EmailAction::CheckCalendar(args) => format!("# Calendar Check\n\n{}", args.dates.join(", ")),
        EmailAction::Done(_) => "# Done".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::actions::QuestionArgs;

    #[test]
    fn test_clean_thread() {
        assert_eq!(clean_thread("Hi  \n\n\n\nThanks\t\n"), "Hi\n\nThanks");
        assert_eq!(clean_thread("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_email_markdown_handles_missing_fields() {
        let text = email_markdown(&EmailInput::new("Meeting?"));
        assert!(text.starts_with("## Email: Meeting?"));
        assert!(text.contains("**From**: \n"));
        assert!(!text.contains("**ID**"));
    }

    #[test]
    fn test_action_markdown() {
        let text = action_markdown(&EmailAction::Question(QuestionArgs {
            content: "Which day?".into(),
        }));
        assert_eq!(text, "# Question for User\n\nWhich day?");
    }
}
