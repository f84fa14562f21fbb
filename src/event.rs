//! Events published to subscribers and commands accepted from callers.
//!
//! Both are transport-agnostic: the daemon frames them as JSON lines, tests
//! read them straight off the broadcast channel.

use crate::agent::{AgentId, AgentStatus, Provider};
use crate::process::ProcessMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    AgentCreated {
        id: AgentId,
        provider: Provider,
        working_dir: PathBuf,
    },
    AgentClosed {
        id: AgentId,
    },
    AgentStatus {
        id: AgentId,
        status: AgentStatus,
    },
    ToolStart {
        id: AgentId,
        tool_id: String,
        status: String,
    },
    ToolDone {
        id: AgentId,
        tool_id: String,
    },
    ToolsClear {
        id: AgentId,
    },
    SubagentToolStart {
        id: AgentId,
        parent_tool_id: String,
        tool_id: String,
        status: String,
    },
    SubagentToolDone {
        id: AgentId,
        parent_tool_id: String,
        tool_id: String,
    },
    SubagentClear {
        id: AgentId,
        parent_tool_id: String,
    },
    PermissionNotice {
        id: AgentId,
    },
    PermissionClear {
        id: AgentId,
    },
    Heartbeat {
        id: AgentId,
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },
    ResyncResult {
        id: AgentId,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    TeamSync {
        source_id: AgentId,
        targets: Vec<AgentId>,
    },
    AgentList {
        agents: Vec<AgentSummary>,
    },
    Error {
        message: String,
    },
}

impl AgentEvent {
    /// The agent an event is about, if it concerns a single agent.
    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            AgentEvent::AgentCreated { id, .. }
            | AgentEvent::AgentClosed { id }
            | AgentEvent::AgentStatus { id, .. }
            | AgentEvent::ToolStart { id, .. }
            | AgentEvent::ToolDone { id, .. }
            | AgentEvent::ToolsClear { id }
            | AgentEvent::SubagentToolStart { id, .. }
            | AgentEvent::SubagentToolDone { id, .. }
            | AgentEvent::SubagentClear { id, .. }
            | AgentEvent::PermissionNotice { id }
            | AgentEvent::PermissionClear { id }
            | AgentEvent::Heartbeat { id, .. }
            | AgentEvent::ResyncResult { id, .. } => Some(*id),
            AgentEvent::TeamSync { source_id, .. } => Some(*source_id),
            AgentEvent::AgentList { .. } | AgentEvent::Error { .. } => None,
        }
    }
}

/// Snapshot of one agent for `agent-list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: AgentId,
    pub provider: Provider,
    pub working_dir: PathBuf,
    pub status: AgentStatus,
    pub transcript: Option<PathBuf>,
    pub focused: bool,
    pub active_tools: Vec<String>,
    pub mode: ProcessMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// How an inbound prompt picks its target agent(s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Broadcast,
    RoundRobin,
    #[default]
    Active,
}

impl std::str::FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(Route::Broadcast),
            "round_robin" | "round-robin" => Ok(Route::RoundRobin),
            "active" => Ok(Route::Active),
            other => Err(format!("unknown route '{}'", other)),
        }
    }
}

/// Commands accepted from callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    SpawnAgent {
        #[serde(default)]
        provider: Option<Provider>,
        #[serde(default)]
        working_dir: Option<PathBuf>,
        #[serde(default)]
        prompt: Option<String>,
    },
    SendPrompt {
        text: String,
        #[serde(default)]
        route: Route,
        #[serde(default)]
        provider: Option<Provider>,
    },
    SendPromptToAgent {
        id: AgentId,
        text: String,
    },
    FocusAgent {
        id: AgentId,
    },
    CloseAgent {
        id: AgentId,
    },
    ResyncAgent {
        id: AgentId,
    },
    /// Relay a status summary of `source_id`; no `target_id` means every other agent.
    Relay {
        source_id: AgentId,
        #[serde(default)]
        target_id: Option<AgentId>,
        #[serde(default)]
        note: Option<String>,
    },
    ListAgents,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_start_wire_shape() {
        let event = AgentEvent::ToolStart {
            id: AgentId(4),
            tool_id: "t1".to_string(),
            status: "Running: ls -la".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool-start", "id": 4, "toolId": "t1", "status": "Running: ls -la"})
        );
    }

    #[test]
    fn resync_reason_omitted_when_ok() {
        let event = AgentEvent::ResyncResult { id: AgentId(1), ok: true, reason: None };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "resync-result", "id": 1, "ok": true})
        );
    }

    #[test]
    fn send_prompt_defaults_to_active_route() {
        let cmd: Command = serde_json::from_value(json!({"type": "send-prompt", "text": "hi"})).unwrap();
        assert_eq!(
            cmd,
            Command::SendPrompt { text: "hi".to_string(), route: Route::Active, provider: None }
        );

        let cmd: Command =
            serde_json::from_value(json!({"type": "send-prompt", "text": "hi", "route": "round_robin"}))
                .unwrap();
        assert!(matches!(cmd, Command::SendPrompt { route: Route::RoundRobin, .. }));
    }

    #[test]
    fn relay_without_target_means_all() {
        let cmd: Command =
            serde_json::from_value(json!({"type": "relay", "sourceId": 2, "note": "fyi"})).unwrap();
        assert_eq!(
            cmd,
            Command::Relay { source_id: AgentId(2), target_id: None, note: Some("fyi".to_string()) }
        );
    }
}
