//! Agent model and registry
//!
//! An agent is one tracked coding-CLI session: the process we spawned, the
//! transcript it writes, and the turn state derived from that transcript.

mod registry;
mod tools;

pub use registry::*;
pub use tools::*;

use crate::process::AgentProcess;
use crate::watcher::TranscriptTail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::time::Instant;

/// Process-unique agent identifier, never reused while the registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which coding-agent CLI (and transcript dialect) an agent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Claude Code: one `<session-id>.jsonl` per session under a per-project dir.
    Claude,
    /// Codex: `rollout-*.jsonl` files under `YYYY/MM/DD` directories.
    Codex,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Claude => write!(f, "claude"),
            Provider::Codex => write!(f, "codex"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "claude-code" => Ok(Provider::Claude),
            "codex" => Ok(Provider::Codex),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

impl Provider {
    /// Providers in PATH-detection order.
    pub const ALL: [Provider; 2] = [Provider::Claude, Provider::Codex];

    /// Get the command to spawn this agent
    pub fn command(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Codex => "codex",
        }
    }

    /// Arguments for a new interactive session.
    ///
    /// Claude accepts our session id and names its transcript after it;
    /// codex picks its own rollout file name.
    pub fn launch_args(&self, session_id: &str) -> Vec<String> {
        match self {
            Provider::Claude => vec!["--session-id".to_string(), session_id.to_string()],
            Provider::Codex => vec![],
        }
    }

    /// Infer the dialect of a transcript from the shape of its path.
    pub fn infer_from_path(path: &Path) -> Provider {
        let is_rollout = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("rollout-"));
        if is_rollout {
            Provider::Codex
        } else {
            Provider::Claude
        }
    }
}

/// Coarse status reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Model output or tool activity is expected
    Active,
    /// Turn is over, waiting for the next prompt
    Waiting,
}

/// Turn state derived from the transcript.
#[derive(Debug, Default)]
pub struct TurnState {
    /// In-flight tool invocations, including delegated sub-tools
    pub tools: ToolArena,
    pub is_waiting: bool,
    /// A "needs approval" notice went out for the current idle period
    pub permission_sent: bool,
    /// Separates narration between tool calls from a final text-only answer
    pub had_tool_use: bool,
}

/// A tracked agent session
pub struct Agent {
    pub id: AgentId,
    pub provider: Provider,
    /// Session identifier generated at spawn time
    pub session_id: String,
    pub workdir: PathBuf,
    /// The process this agent owns
    pub process: Box<dyn AgentProcess>,
    /// Transcript being tailed; `None` while a codex transcript is still pending
    pub transcript: Option<TranscriptTail>,
    /// Whether the transcript file has ever been observed on disk
    pub transcript_seen: bool,
    pub turn: TurnState,
    /// Monotonic spawn time, for the early-exit window
    pub spawned_at: Instant,
    /// Wall-clock spawn time, compared against transcript mtimes
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn transcript_path(&self) -> Option<&Path> {
        self.transcript.as_ref().map(|tail| tail.path())
    }

    pub fn read_offset(&self) -> u64 {
        self.transcript.as_ref().map_or(0, |tail| tail.offset())
    }

    pub fn status(&self) -> AgentStatus {
        if self.turn.is_waiting {
            AgentStatus::Waiting
        } else {
            AgentStatus::Active
        }
    }
}

#[cfg(test)]
impl Agent {
    /// Agent with a fake process and no transcript yet.
    pub(crate) fn stub(id: AgentId, provider: Provider, workdir: PathBuf) -> Self {
        Self {
            id,
            provider,
            session_id: format!("session-{}", id),
            workdir,
            process: Box::new(crate::process::fake::FakeProcess::new()),
            transcript: None,
            transcript_seen: false,
            turn: TurnState::default(),
            spawned_at: Instant::now(),
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("session_id", &self.session_id)
            .field("workdir", &self.workdir)
            .field("transcript", &self.transcript_path())
            .field("turn", &self.turn)
            .field("created_at", &self.created_at)
            .finish()
    }
}
