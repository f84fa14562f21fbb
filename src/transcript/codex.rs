//! Codex rollout dialect.
//!
//! Records carry a `type` of `session_meta`, `event_msg`, `response_item` or
//! `turn_context`, with the interesting part under `payload`.

use super::format_tool_status;
use super::{Signal, ToolCall, PERMISSION_SENSITIVE_TOOLS};
use crate::agent::Provider;
use serde_json::Value;

pub fn decode(record: &Value) -> Vec<Signal> {
    let payload = record.get("payload").unwrap_or(&Value::Null);
    match record.get("type").and_then(Value::as_str) {
        Some("event_msg") => decode_event(payload),
        Some("response_item") => decode_response_item(payload),
        _ => Vec::new(),
    }
}

fn decode_event(payload: &Value) -> Vec<Signal> {
    match payload.get("type").and_then(Value::as_str) {
        Some("user_message") | Some("turn_aborted") => vec![Signal::TurnStarted],
        Some("task_complete") => vec![Signal::TurnEnded],
        _ => Vec::new(),
    }
}

fn decode_response_item(payload: &Value) -> Vec<Signal> {
    match payload.get("type").and_then(Value::as_str) {
        Some("function_call") | Some("custom_tool_call") => {
            tool_call(payload).map_or_else(Vec::new, |call| vec![Signal::ToolsStarted(vec![call])])
        }
        Some("function_call_output") | Some("custom_tool_call_output") => payload
            .get("call_id")
            .and_then(Value::as_str)
            .map_or_else(Vec::new, |id| vec![Signal::ToolResults(vec![id.to_string()])]),
        Some("message") => decode_message(payload),
        _ => Vec::new(),
    }
}

fn decode_message(payload: &Value) -> Vec<Signal> {
    if payload.get("role").and_then(Value::as_str) != Some("assistant") {
        return Vec::new();
    }
    match payload.get("phase").and_then(Value::as_str) {
        Some("final_answer") => vec![Signal::TurnEnded],
        _ => vec![Signal::AssistantText],
    }
}

fn tool_call(payload: &Value) -> Option<ToolCall> {
    let id = payload.get("call_id")?.as_str()?;
    let name = payload.get("name")?.as_str()?;
    let arguments = tool_arguments(payload);
    Some(ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        status: format_tool_status(Provider::Codex, name, &arguments),
        approval_sensitive: PERMISSION_SENSITIVE_TOOLS.contains(&name),
    })
}

/// `function_call` arguments arrive as a JSON-encoded string;
/// `custom_tool_call` carries a raw `input` string.
fn tool_arguments(payload: &Value) -> Value {
    match payload.get("arguments").or_else(|| payload.get("input")) {
        Some(Value::String(raw)) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}
