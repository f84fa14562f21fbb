//! Claude Code transcript dialect.
//!
//! Records carry a `type` of `assistant`, `user`, `system` or `progress`.
//! Message content is an array of blocks (`text`, `tool_use`,
//! `tool_result`, ...); user content may also be a bare string.

use super::format_tool_status;
use super::{is_permission_exempt, Signal, ToolCall};
use crate::agent::Provider;
use serde_json::Value;

pub fn decode(record: &Value) -> Vec<Signal> {
    match record.get("type").and_then(Value::as_str) {
        Some("assistant") => decode_assistant(record.pointer("/message/content")),
        Some("user") => decode_user(record.pointer("/message/content")),
        Some("system") => decode_system(record),
        Some("progress") => decode_progress(record),
        _ => Vec::new(),
    }
}

fn decode_assistant(content: Option<&Value>) -> Vec<Signal> {
    let Some(blocks) = content.and_then(Value::as_array) else {
        return Vec::new();
    };

    let tools = tool_calls(blocks);
    if !tools.is_empty() {
        vec![Signal::ToolsStarted(tools)]
    } else if blocks.iter().any(|block| block_type(block) == Some("text")) {
        vec![Signal::AssistantText]
    } else {
        Vec::new()
    }
}

fn decode_user(content: Option<&Value>) -> Vec<Signal> {
    match content {
        Some(Value::String(text)) if !text.trim().is_empty() => vec![Signal::TurnStarted],
        Some(Value::Array(blocks)) => {
            let results = tool_result_ids(blocks);
            if !results.is_empty() {
                vec![Signal::ToolResults(results)]
            } else if blocks.iter().any(|block| block_type(block) == Some("text")) {
                vec![Signal::TurnStarted]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn decode_system(record: &Value) -> Vec<Signal> {
    match record.get("subtype").and_then(Value::as_str) {
        Some("turn_duration") => vec![Signal::TurnEnded],
        _ => Vec::new(),
    }
}

/// `progress` records describe activity under a running tool, identified by
/// `parentToolUseID`.
fn decode_progress(record: &Value) -> Vec<Signal> {
    let Some(parent) = record.get("parentToolUseID").and_then(Value::as_str) else {
        return Vec::new();
    };
    let parent = parent.to_string();
    let Some(data) = record.get("data") else {
        return Vec::new();
    };

    match data.get("type").and_then(Value::as_str) {
        Some("agent_progress") => {
            let message = data.get("message");
            let content = message
                .and_then(|m| m.pointer("/message/content"))
                .and_then(Value::as_array);
            let Some(blocks) = content else {
                return Vec::new();
            };
            match message.and_then(|m| m.get("type")).and_then(Value::as_str) {
                Some("assistant") => {
                    let tools = tool_calls(blocks);
                    if tools.is_empty() {
                        Vec::new()
                    } else {
                        vec![Signal::SubToolsStarted { parent, tools }]
                    }
                }
                Some("user") => {
                    let ids = tool_result_ids(blocks);
                    if ids.is_empty() {
                        Vec::new()
                    } else {
                        vec![Signal::SubToolResults { parent, ids }]
                    }
                }
                _ => Vec::new(),
            }
        }
        Some("bash_progress") | Some("mcp_progress") => vec![Signal::ToolProgress { parent }],
        _ => Vec::new(),
    }
}

fn tool_calls(blocks: &[Value]) -> Vec<ToolCall> {
    blocks
        .iter()
        .filter(|block| block_type(block) == Some("tool_use"))
        .filter_map(|block| {
            let id = block.get("id")?.as_str()?;
            let name = block.get("name")?.as_str()?;
            let input = block.get("input").unwrap_or(&Value::Null);
            Some(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                status: format_tool_status(Provider::Claude, name, input),
                approval_sensitive: !is_permission_exempt(name),
            })
        })
        .collect()
}

fn tool_result_ids(blocks: &[Value]) -> Vec<String> {
    blocks
        .iter()
        .filter(|block| block_type(block) == Some("tool_result"))
        .filter_map(|block| block.get("tool_use_id").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(Value::as_str)
}
