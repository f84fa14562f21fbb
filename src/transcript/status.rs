//! Human-readable tool status text, derived only from tool name and arguments.

use crate::agent::Provider;
use crate::config::{BASH_COMMAND_DISPLAY_MAX, TASK_DESCRIPTION_DISPLAY_MAX};
use serde_json::Value;
use std::path::Path;

/// Status line for a tool call in the given provider's vocabulary.
pub fn format_tool_status(provider: Provider, name: &str, input: &Value) -> String {
    match provider {
        Provider::Claude => claude_tool_status(name, input),
        Provider::Codex => codex_tool_status(name, input),
    }
}

fn claude_tool_status(name: &str, input: &Value) -> String {
    match name {
        "Read" => file_status("Reading", input.get("file_path")),
        "Edit" | "MultiEdit" => file_status("Editing", input.get("file_path")),
        "Write" => file_status("Writing", input.get("file_path")),
        "NotebookEdit" => file_status("Editing", input.get("notebook_path")),
        "Bash" => {
            let command = input.get("command").and_then(Value::as_str).unwrap_or_default();
            running(command)
        }
        "Glob" => "Searching files".to_string(),
        "Grep" => "Searching code".to_string(),
        "WebFetch" => "Fetching web content".to_string(),
        "WebSearch" => "Searching the web".to_string(),
        "Task" | "Agent" => match input.get("description").and_then(Value::as_str) {
            Some(desc) if !desc.trim().is_empty() => {
                format!("Subtask: {}", truncate(desc.trim(), TASK_DESCRIPTION_DISPLAY_MAX))
            }
            _ => "Running subtask".to_string(),
        },
        "AskUserQuestion" => "Waiting for your answer".to_string(),
        "EnterPlanMode" => "Planning".to_string(),
        "TodoWrite" => "Updating todos".to_string(),
        other => format!("Using {}", other),
    }
}

fn codex_tool_status(name: &str, arguments: &Value) -> String {
    match name {
        "shell" | "exec_command" | "shell_command" => running(&command_preview(arguments)),
        "apply_patch" => "Applying patch".to_string(),
        "update_plan" => "Updating plan".to_string(),
        "view_image" => file_status("Viewing", arguments.get("path")),
        "web_search" => "Searching the web".to_string(),
        "request_user_input" => "Waiting for your answer".to_string(),
        other => format!("Using {}", other),
    }
}

/// Command line from codex shell arguments. Accepts `cmd` or `command`, as a
/// string or an argv array; a leading `bash -lc` style wrapper is dropped.
fn command_preview(arguments: &Value) -> String {
    let command = arguments.get("cmd").or_else(|| arguments.get("command"));
    match command {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => {
            let argv: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            match argv.as_slice() {
                [shell, flag, script, ..] if is_shell(shell) && matches!(*flag, "-c" | "-lc") => {
                    script.to_string()
                }
                _ => argv.join(" "),
            }
        }
        _ => String::new(),
    }
}

fn is_shell(program: &str) -> bool {
    let base = Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program);
    matches!(base, "bash" | "sh" | "zsh")
}

fn running(command: &str) -> String {
    format!("Running: {}", truncate(command.trim(), BASH_COMMAND_DISPLAY_MAX))
}

fn file_status(verb: &str, path: Option<&Value>) -> String {
    let base = path
        .and_then(Value::as_str)
        .and_then(|p| Path::new(p).file_name())
        .map(|name| name.to_string_lossy().into_owned());
    match base {
        Some(base) => format!("{} {}", verb, base),
        None => format!("{} file", verb),
    }
}

/// Truncate to `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push('\u{2026}');
    cut
}
