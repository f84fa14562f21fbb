//! Spawning, prompting, exit handling and teardown of agents.

use super::{LoopEvent, Orchestrator, ScanKey};
use crate::agent::{Agent, AgentId, Provider, TurnState};
use crate::event::{AgentEvent, AgentSummary};
use crate::process::{resolve_provider, LaunchSpec};
use crate::watcher::{scan, TranscriptTail};
use crate::VigilError;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

impl Orchestrator {
    /// Launch a new agent CLI and start tracking it.
    ///
    /// A launch failure is reported as an `error` event and no agent is
    /// created.
    pub(super) fn spawn_agent(
        &mut self,
        requested: Option<Provider>,
        working_dir: Option<PathBuf>,
        prompt: Option<String>,
    ) -> Option<AgentId> {
        let launcher = &self.launcher;
        let provider = resolve_provider(
            requested,
            self.config.provider_override,
            self.config.default_provider,
            |command| launcher.is_installed(command),
        );
        let workdir = self.resolve_workdir(working_dir);
        let session_id = Uuid::new_v4().to_string();
        let id = self.registry.allocate_id();

        let spec = LaunchSpec::new(id, provider, &session_id, workdir.clone());
        let process = match self.launcher.launch(&spec, self.tx.clone()) {
            Ok(process) => {
                debug!("Agent {} running as {:?} (pid {:?})", id, process.mode(), process.pid());
                process
            }
            Err(e) => {
                error!("Failed to launch {} in {}: {}", provider, workdir.display(), e);
                self.emit(AgentEvent::Error {
                    message: format!("Failed to launch {} agent: {}", provider, e),
                });
                return None;
            }
        };

        let transcript = match provider {
            Provider::Claude => Some(TranscriptTail::new(scan::claude_transcript_path(
                self.config.transcript_root(provider),
                &workdir,
                &session_id,
            ))),
            Provider::Codex => None,
        };

        // seed before registering so pre-existing files are never adopted
        self.ensure_scan(ScanKey { provider, workdir: workdir.clone() });

        self.registry.insert(Agent {
            id,
            provider,
            session_id,
            workdir: workdir.clone(),
            process,
            transcript,
            transcript_seen: false,
            turn: TurnState::default(),
            spawned_at: Instant::now(),
            created_at: Utc::now(),
        });
        self.registry.focus(id);
        info!("Spawned {} agent {} in {} ({:?})", provider, id, workdir.display(), spec.args);
        self.emit(AgentEvent::AgentCreated { id, provider, working_dir: workdir });

        if let Some(text) = prompt {
            self.schedule_prompt(id, text);
        }
        self.start_discovery(id);
        Some(id)
    }

    fn resolve_workdir(&self, working_dir: Option<PathBuf>) -> PathBuf {
        match working_dir {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => self.config.default_workdir.join(dir),
            None => self.config.default_workdir.clone(),
        }
    }

    /// Type `text` into the agent once the CLI has had time to start.
    fn schedule_prompt(&self, id: AgentId, text: String) {
        let tx = self.tx.clone();
        let delay = self.config.timings.prompt_startup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopEvent::DeliverPrompt { agent: id, text });
        });
    }

    /// Submit `text` to an agent's CLI. Failures are reported as `error`
    /// events.
    pub(super) fn deliver_prompt(&mut self, id: AgentId, text: &str) -> bool {
        let Some(agent) = self.registry.get_mut(id) else {
            debug!("Dropping prompt for closed agent {}", id);
            return false;
        };
        match agent.process.submit(text) {
            Ok(()) => {
                debug!("Sent {} bytes to agent {}", text.len(), id);
                true
            }
            Err(e) => {
                warn!("Failed to send prompt to agent {}: {}", id, e);
                self.emit(AgentEvent::Error {
                    message: format!("Failed to send prompt to agent {}: {}", id, e),
                });
                false
            }
        }
    }

    /// The CLI went away on its own.
    pub(super) fn process_exited(&mut self, id: AgentId, success: bool, code: Option<i32>) {
        let Some(agent) = self.registry.get(id) else {
            return;
        };

        let uptime = agent.spawned_at.elapsed();
        let transcript_appeared =
            agent.transcript_seen || agent.transcript_path().is_some_and(Path::exists);
        if !success && uptime < self.config.timings.early_exit_window && !transcript_appeared {
            let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            let mut message = format!(
                "{} agent {} exited ({}) after {:.1}s before writing a transcript; is `{}` installed and signed in?",
                agent.provider,
                id,
                code,
                uptime.as_secs_f64(),
                agent.provider.command(),
            );
            if let Some(line) = agent.process.last_output_line() {
                message.push_str(&format!(" Last output: {}", line));
            }
            error!("{}", message);
            self.emit(AgentEvent::Error { message });
        } else {
            info!("Agent {} exited (success: {}, code: {:?})", id, success, code);
        }

        self.remove_agent(id);
    }

    /// Kill an agent's process and stop tracking it.
    pub(super) fn close_agent(&mut self, id: AgentId) {
        let Some(agent) = self.registry.get_mut(id) else {
            self.emit_error(VigilError::AgentNotFound(id));
            return;
        };
        if let Err(e) = agent.process.kill() {
            debug!("Kill of agent {} failed (already gone?): {}", id, e);
        }
        self.remove_agent(id);
    }

    /// Tear down everything attached to an agent. Its transcript stays
    /// known so the project scan won't hand it to anyone else.
    fn remove_agent(&mut self, id: AgentId) {
        self.timers.cancel_all(id);
        self.watches.remove(&id);
        self.stop_discovery(id);

        let Some(agent) = self.registry.remove(id) else {
            return;
        };
        self.release_scan(&ScanKey {
            provider: agent.provider,
            workdir: agent.workdir.clone(),
        });
        info!("Closed agent {}", id);
        self.emit(AgentEvent::AgentClosed { id });
    }

    pub(super) fn list_agents(&self) {
        let focused = self.registry.focused();
        let agents = self
            .registry
            .agents()
            .map(|agent| AgentSummary {
                id: agent.id,
                provider: agent.provider,
                working_dir: agent.workdir.clone(),
                status: agent.status(),
                transcript: agent.transcript_path().map(Path::to_path_buf),
                focused: focused == Some(agent.id),
                active_tools: agent.turn.tools.top_level().map(|tool| tool.status.clone()).collect(),
                mode: agent.process.mode(),
                pid: agent.process.pid(),
            })
            .collect();
        self.emit(AgentEvent::AgentList { agents });
    }
}
