//! Agent processes
//!
//! An agent CLI runs in a PTY when the host supports one, otherwise with a
//! piped stdin. Either way the orchestrator only sees [`AgentProcess`]:
//! submit a prompt, kill, and an exit reported back through the event loop.

mod buffer;
mod piped;
mod pty;

pub use buffer::RingBuffer;
pub use piped::PipedProcess;
pub use pty::PtyProcess;

use crate::agent::{AgentId, Provider};
use crate::orchestrator::LoopEvent;
use crate::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessMode {
    Pty,
    Piped,
}

/// Handle to a running agent CLI.
///
/// Exit is not polled: the implementation posts
/// [`LoopEvent::ProcessExited`] once the child is gone.
pub trait AgentProcess: Send {
    /// Type `text` into the CLI and submit it.
    fn submit(&mut self, text: &str) -> Result<()>;

    fn kill(&mut self) -> Result<()>;

    fn mode(&self) -> ProcessMode;

    fn pid(&self) -> Option<u32>;

    /// Last line the CLI printed, if output is captured.
    fn last_output_line(&self) -> Option<String> {
        None
    }
}

/// What to launch for a new agent.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub agent: AgentId,
    pub provider: Provider,
    pub command: String,
    pub args: Vec<String>,
    pub workdir: PathBuf,
}

impl LaunchSpec {
    pub fn new(agent: AgentId, provider: Provider, session_id: &str, workdir: PathBuf) -> Self {
        Self {
            agent,
            provider,
            command: provider.command().to_string(),
            args: provider.launch_args(session_id),
            workdir,
        }
    }
}

/// Starts agent processes. Swapped out in tests.
pub trait ProcessLauncher: Send {
    fn launch(&self, spec: &LaunchSpec, exits: UnboundedSender<LoopEvent>) -> Result<Box<dyn AgentProcess>>;

    /// Whether `command` can be found on PATH.
    fn is_installed(&self, command: &str) -> bool;
}

/// Launches real CLIs: PTY first, pipes as fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec, exits: UnboundedSender<LoopEvent>) -> Result<Box<dyn AgentProcess>> {
        match PtyProcess::spawn(spec, exits.clone()) {
            Ok(process) => Ok(Box::new(process)),
            Err(pty_err) => {
                warn!("PTY launch of {} failed ({}), falling back to pipes", spec.command, pty_err);
                let process = PipedProcess::spawn(spec, exits).map_err(|e| {
                    VigilError::Launch(format!("{}: {}", spec.command, e))
                })?;
                Ok(Box::new(process))
            }
        }
    }

    fn is_installed(&self, command: &str) -> bool {
        which::which(command).is_ok()
    }
}

/// Pick the provider for a new agent.
///
/// An explicit request wins, then the environment override, then whichever
/// CLI is installed (claude first), then `default`.
pub fn resolve_provider(
    requested: Option<Provider>,
    override_provider: Option<Provider>,
    default: Provider,
    is_installed: impl Fn(&str) -> bool,
) -> Provider {
    requested
        .or(override_provider)
        .or_else(|| {
            Provider::ALL
                .into_iter()
                .find(|provider| is_installed(provider.command()))
        })
        .unwrap_or(default)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_provider_wins() {
        let provider = resolve_provider(Some(Provider::Codex), Some(Provider::Claude), Provider::Claude, |_| true);
        assert_eq!(provider, Provider::Codex);
    }

    #[test]
    fn override_beats_detection() {
        let provider = resolve_provider(None, Some(Provider::Codex), Provider::Claude, |cmd| cmd == "claude");
        assert_eq!(provider, Provider::Codex);
    }

    #[test]
    fn detection_prefers_claude_then_codex() {
        assert_eq!(resolve_provider(None, None, Provider::Codex, |_| true), Provider::Claude);
        assert_eq!(
            resolve_provider(None, None, Provider::Claude, |cmd| cmd == "codex"),
            Provider::Codex
        );
        assert_eq!(resolve_provider(None, None, Provider::Codex, |_| false), Provider::Codex);
    }

    #[test]
    fn launch_spec_from_provider() {
        let spec = LaunchSpec::new(AgentId(2), Provider::Claude, "s-1", PathBuf::from("/w"));
        assert_eq!(spec.command, "claude");
        assert_eq!(spec.args, vec!["--session-id", "s-1"]);
    }
}
