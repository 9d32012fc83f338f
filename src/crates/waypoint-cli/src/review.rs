//! Answering interrupts at the terminal

use anyhow::{bail, Result};
use std::io::{BufRead, Write};
use waypoint_core::{HumanResponse, InterruptRequest};

fn options(request: &InterruptRequest) -> String {
    let modes = &request.config;
    let mut options = Vec::new();
    if modes.allow_accept {
        options.push("[a]ccept");
    }
    if modes.allow_edit {
        options.push("[e]dit");
    }
    if modes.allow_ignore {
        options.push("[i]gnore");
    }
    if modes.allow_respond {
        options.push("[r]espond");
    }
    options.join(", ")
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed before the interrupt was answered");
    }
    Ok(line.trim().to_string())
}

/// Show one interrupt and read a permitted decision
///
/// Edits take the replacement arguments as one line of JSON. `respond` may
/// carry its text on the same line (`r Tuesday works`).
pub fn prompt_response<R: BufRead, W: Write>(
    request: &InterruptRequest,
    input: &mut R,
    output: &mut W,
) -> Result<HumanResponse> {
    if !request.description.is_empty() {
        writeln!(output, "{}\n", request.description)?;
    }
    writeln!(output, "Action: {}", request.action_request.action)?;
    writeln!(
        output,
        "Arguments: {}",
        serde_json::to_string_pretty(&request.action_request.args)?
    )?;

    loop {
        write!(output, "{} > ", options(request))?;
        output.flush()?;
        let line = read_line(input)?;
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line.as_str(), ""),
        };

        let response = match command.to_lowercase().as_str() {
            "a" | "accept" => HumanResponse::Accept,
            "i" | "ignore" => HumanResponse::Ignore,
            "e" | "edit" => {
                write!(output, "New arguments (JSON): ")?;
                output.flush()?;
                match serde_json::from_str(&read_line(input)?) {
                    Ok(args) => HumanResponse::edit(&request.action_request.action, args),
                    Err(err) => {
                        writeln!(output, "Invalid JSON: {err}")?;
                        continue;
                    }
                }
            }
            "r" | "respond" => {
                let text = if rest.is_empty() {
                    write!(output, "Feedback: ")?;
                    output.flush()?;
                    read_line(input)?
                } else {
                    rest.to_string()
                };
                HumanResponse::respond(text)
            }
            _ => {
                writeln!(output, "Unknown choice '{line}'")?;
                continue;
            }
        };

        if request.config.permits(&response) {
            return Ok(response);
        }
        writeln!(output, "'{}' is not allowed for this request", response.kind())?;
    }
}
