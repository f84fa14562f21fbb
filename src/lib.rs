//! Vigil: lifecycle and status engine for coding-agent CLI sessions
//!
//! Spawns agent CLIs, tails the JSON-lines transcripts they write, and turns
//! those transcripts into a small cross-provider state machine
//! (active / waiting / needs-permission) that any front-end can subscribe to.

pub mod agent;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod event;
pub mod orchestrator;
pub mod process;
pub mod timers;
pub mod transcript;
pub mod watcher;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(agent::AgentId),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Daemon error: {0}")]
    Daemon(String),
}

pub type Result<T> = std::result::Result<T, VigilError>;
