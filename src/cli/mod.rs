//! CLI command definitions

use crate::agent::{AgentId, Provider};
use crate::event::{Command, Route};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Lifecycle and status engine for coding-agent CLI sessions", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Daemon socket (defaults to ~/.vigil/vigil.sock)
    #[arg(short, long, global = true)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the daemon in the foreground
    Serve,

    /// Spawn a new agent
    Spawn {
        /// claude or codex (defaults to VIGIL_PROVIDER, then whatever is installed)
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Working directory for the agent
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Prompt to submit once the agent is up
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Route a prompt to one or more agents
    Prompt {
        text: String,

        /// active, round-robin or broadcast
        #[arg(short, long, default_value = "active")]
        route: Route,

        /// Provider to spawn with if no agent is running
        #[arg(short, long)]
        provider: Option<Provider>,
    },

    /// Send a prompt to one agent
    Send { id: u64, text: String },

    /// Make an agent the default target for prompts
    Focus { id: u64 },

    /// Stop an agent
    Close { id: u64 },

    /// Re-attach an agent to its transcript
    Resync { id: u64 },

    /// Paste an agent's status into other agents
    Relay {
        /// Agent whose status is relayed
        source: u64,

        /// Single target (defaults to every other agent)
        #[arg(long)]
        to: Option<u64>,

        #[arg(long)]
        note: Option<String>,
    },

    /// List agents
    List,

    /// Stream events as JSON lines
    Events,
}

impl Commands {
    /// The daemon command this subcommand sends, if any.
    pub fn to_command(&self) -> Option<Command> {
        let command = match self {
            Commands::Serve | Commands::Events => return None,
            Commands::Spawn { provider, dir, prompt } => Command::SpawnAgent {
                provider: *provider,
                working_dir: dir.clone(),
                prompt: prompt.clone(),
            },
            Commands::Prompt { text, route, provider } => Command::SendPrompt {
                text: text.clone(),
                route: *route,
                provider: *provider,
            },
            Commands::Send { id, text } => Command::SendPromptToAgent {
                id: AgentId(*id),
                text: text.clone(),
            },
            Commands::Focus { id } => Command::FocusAgent { id: AgentId(*id) },
            Commands::Close { id } => Command::CloseAgent { id: AgentId(*id) },
            Commands::Resync { id } => Command::ResyncAgent { id: AgentId(*id) },
            Commands::Relay { source, to, note } => Command::Relay {
                source_id: AgentId(*source),
                target_id: to.map(AgentId),
                note: note.clone(),
            },
            Commands::List => Command::ListAgents,
        };
        Some(command)
    }
}
