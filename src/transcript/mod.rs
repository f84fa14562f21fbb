//! Transcript parsing
//!
//! Each provider writes its own JSON-lines dialect. A line is decoded once,
//! at the entry point, into the shared [`Signal`] vocabulary; everything
//! after that (tool bookkeeping, timers, events) is provider-agnostic and
//! lives in [`machine`].
//!
//! ```text
//!   line ──► claude::decode ─┐
//!                            ├─► Vec<Signal> ──► machine::apply ──► Effects
//!   line ──► codex::decode ──┘
//! ```

pub mod claude;
pub mod codex;
pub mod machine;
pub mod status;

pub use machine::{apply, end_turn, permission_elapsed};
pub use status::format_tool_status;

use crate::agent::{AgentId, Provider, TurnState};
use crate::event::AgentEvent;
use crate::timers::TimerKind;
use serde_json::Value;

/// Tools that delegate to a sub-agent or ask the user; they never count as
/// waiting for approval.
pub const PERMISSION_EXEMPT_TOOLS: &[&str] = &["Task", "Agent", "AskUserQuestion", "request_user_input"];

/// Tools whose sub-tool activity is reported through `progress` records.
pub const DELEGATION_TOOLS: &[&str] = &["Task", "Agent"];

/// Codex tools that may block on an approval prompt.
pub const PERMISSION_SENSITIVE_TOOLS: &[&str] =
    &["shell", "exec_command", "shell_command", "apply_patch", "write_stdin"];

pub fn is_permission_exempt(name: &str) -> bool {
    PERMISSION_EXEMPT_TOOLS.contains(&name)
}

pub fn is_delegation(name: &str) -> bool {
    DELEGATION_TOOLS.contains(&name)
}

/// A tool call as decoded from either dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub status: String,
    pub approval_sensitive: bool,
}

/// Provider-agnostic meaning of one transcript record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The model invoked one or more tools
    ToolsStarted(Vec<ToolCall>),
    /// Results came back for these tool ids
    ToolResults(Vec<String>),
    /// The model produced text without invoking a tool
    AssistantText,
    /// A new user turn began (fresh prompt or aborted turn)
    TurnStarted,
    /// The provider says the turn is over
    TurnEnded,
    /// A delegated task invoked tools of its own
    SubToolsStarted { parent: String, tools: Vec<ToolCall> },
    /// Results came back for a delegated task's tools
    SubToolResults { parent: String, ids: Vec<String> },
    /// A running tool reported progress
    ToolProgress { parent: String },
}

/// Timer slot changes requested by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Start(TimerKind),
    Cancel(TimerKind),
}

/// Everything one line (or one timer fire) asks the orchestrator to do.
#[derive(Debug, Default, PartialEq)]
pub struct Effects {
    /// Published immediately, in order
    pub events: Vec<AgentEvent>,
    /// Published after the tool-done display lag
    pub deferred: Vec<AgentEvent>,
    pub timers: Vec<TimerOp>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.deferred.is_empty() && self.timers.is_empty()
    }

    pub fn extend(&mut self, other: Effects) {
        self.events.extend(other.events);
        self.deferred.extend(other.deferred);
        self.timers.extend(other.timers);
    }
}

/// Decode a raw JSON record in the given provider's dialect.
pub fn decode(provider: Provider, record: &Value) -> Vec<Signal> {
    match provider {
        Provider::Claude => claude::decode(record),
        Provider::Codex => codex::decode(record),
    }
}

/// Parse one complete transcript line and apply it to an agent's turn state.
///
/// Lines that aren't JSON, or whose shape isn't recognised, change nothing.
pub fn process_line(id: AgentId, provider: Provider, turn: &mut TurnState, line: &str) -> Effects {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Effects::default();
    }

    let record: Value = match serde_json::from_str(trimmed) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(agent_id = %id, "Skipping malformed transcript line: {}", e);
            return Effects::default();
        }
    };

    let signals = decode(provider, &record);
    if signals.is_empty() {
        tracing::trace!(agent_id = %id, "Ignoring transcript record");
    }
    apply(id, turn, signals)
}
