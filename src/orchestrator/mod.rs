//! Orchestrator: the single owner of agent state
//!
//! Everything that can change an agent (commands, transcript growth, timer
//! fires, process exits, directory scans) arrives as a [`LoopEvent`] on one
//! channel and is handled to completion before the next one is looked at.
//! Background tasks (file watchers, pollers, timers, exit waiters) only post
//! messages, so no agent state is ever shared or locked.
//!
//! ```text
//!  notify / poll ─┐
//!  timers ────────┤                        ┌──► broadcast<AgentEvent>
//!  exit waiters ──┼──► mpsc<LoopEvent> ──► Orchestrator
//!  daemon clients ┘                        └──► AgentProcess::submit
//! ```

mod lifecycle;
mod routing;
mod tailing;

pub use routing::{preferred_agent, relay_summary, select_targets};

use crate::agent::{AgentId, AgentRegistry, Provider};
use crate::config::VigilConfig;
use crate::event::{AgentEvent, Command};
use crate::process::ProcessLauncher;
use crate::timers::{TimerKind, TimerManager};
use crate::transcript::{self, Effects, TimerOp};
use crate::watcher::FileWatch;
use crate::{Result, VigilError};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Buffered events per subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One project directory being scanned for new transcripts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanKey {
    pub provider: Provider,
    pub workdir: PathBuf,
}

/// Messages the event loop handles, one at a time.
#[derive(Debug)]
pub enum LoopEvent {
    /// A caller's request
    Command(Command),
    /// The agent's transcript may have grown
    TranscriptChanged(AgentId),
    /// Look for a spawned agent's transcript
    DiscoveryTick(AgentId),
    /// Look for new transcript files in a project directory
    ProjectScan(ScanKey),
    TimerFired {
        agent: AgentId,
        kind: TimerKind,
        generation: u64,
    },
    /// An event held back for display lag
    Deferred(AgentEvent),
    DeliverPrompt {
        agent: AgentId,
        text: String,
    },
    ProcessExited {
        agent: AgentId,
        success: bool,
        code: Option<i32>,
    },
    /// Close every agent and stop the loop
    Shutdown,
}

/// Cloneable handle for feeding commands in and subscribing to events.
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: UnboundedSender<LoopEvent>,
    events: broadcast::Sender<AgentEvent>,
}

impl OrchestratorHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(LoopEvent::Command(command))
            .map_err(|_| VigilError::Daemon("orchestrator loop has stopped".to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(LoopEvent::Shutdown);
    }
}

pub struct Orchestrator {
    config: VigilConfig,
    registry: AgentRegistry,
    timers: TimerManager,
    launcher: Box<dyn ProcessLauncher>,
    /// Change triggers for agents whose transcript is being tailed
    watches: HashMap<AgentId, FileWatch>,
    /// Pollers for agents still waiting on their transcript
    discovery: HashMap<AgentId, JoinHandle<()>>,
    scans: HashMap<ScanKey, JoinHandle<()>>,
    events: broadcast::Sender<AgentEvent>,
    tx: UnboundedSender<LoopEvent>,
}

impl Orchestrator {
    /// Build an orchestrator and the receiving end of its loop channel.
    /// Nothing happens until [`Orchestrator::run`] drains it.
    pub fn new(
        config: VigilConfig,
        launcher: Box<dyn ProcessLauncher>,
    ) -> (Self, UnboundedReceiver<LoopEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let orchestrator = Self {
            config,
            registry: AgentRegistry::new(),
            timers: TimerManager::new(tx.clone()),
            launcher,
            watches: HashMap::new(),
            discovery: HashMap::new(),
            scans: HashMap::new(),
            events,
            tx,
        };
        (orchestrator, rx)
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            tx: self.tx.clone(),
            events: self.events.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Drain the loop channel until shutdown.
    pub async fn run(mut self, mut rx: UnboundedReceiver<LoopEvent>) {
        info!("Orchestrator loop started");
        while let Some(event) = rx.recv().await {
            if matches!(event, LoopEvent::Shutdown) {
                self.shutdown();
                break;
            }
            self.dispatch(event);
        }
        info!("Orchestrator loop stopped");
    }

    /// Handle one loop message to completion.
    pub fn dispatch(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Command(command) => self.execute(command),
            LoopEvent::TranscriptChanged(id) => self.read_transcript(id),
            LoopEvent::DiscoveryTick(id) => self.discover_transcript(id),
            LoopEvent::ProjectScan(key) => self.scan_project(&key),
            LoopEvent::TimerFired { agent, kind, generation } => {
                self.timer_fired(agent, kind, generation)
            }
            LoopEvent::Deferred(event) => {
                if event.agent_id().is_some_and(|id| self.registry.contains(id)) {
                    self.emit(event);
                }
            }
            LoopEvent::DeliverPrompt { agent, text } => {
                self.deliver_prompt(agent, &text);
            }
            LoopEvent::ProcessExited { agent, success, code } => {
                self.process_exited(agent, success, code)
            }
            LoopEvent::Shutdown => self.shutdown(),
        }
    }

    pub fn execute(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::SpawnAgent { provider, working_dir, prompt } => {
                self.spawn_agent(provider, working_dir, prompt);
            }
            Command::SendPrompt { text, route, provider } => self.send_prompt(text, route, provider),
            Command::SendPromptToAgent { id, text } => {
                if self.registry.contains(id) {
                    self.deliver_prompt(id, &text);
                } else {
                    self.emit_error(VigilError::AgentNotFound(id));
                }
            }
            Command::FocusAgent { id } => {
                if self.registry.focus(id) {
                    debug!("Focused agent {}", id);
                } else {
                    self.emit_error(VigilError::AgentNotFound(id));
                }
            }
            Command::CloseAgent { id } => self.close_agent(id),
            Command::ResyncAgent { id } => self.resync(id),
            Command::Relay { source_id, target_id, note } => self.relay(source_id, target_id, note),
            Command::ListAgents => self.list_agents(),
        }
    }

    fn emit(&self, event: AgentEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_error(&self, error: VigilError) {
        self.emit(AgentEvent::Error { message: error.to_string() });
    }

    /// Carry out what the state machine asked for.
    fn apply_effects(&mut self, id: AgentId, effects: Effects) {
        for op in effects.timers {
            match op {
                TimerOp::Start(kind) => {
                    let delay = match kind {
                        TimerKind::Waiting => self.config.timings.text_idle_delay,
                        TimerKind::Permission => self.config.timings.permission_delay,
                    };
                    self.timers.start(id, kind, delay);
                }
                TimerOp::Cancel(kind) => {
                    self.timers.cancel(id, kind);
                }
            }
        }
        for event in effects.events {
            self.emit(event);
        }
        for event in effects.deferred {
            self.timers.defer(id, self.config.timings.tool_done_delay, event);
        }
    }

    fn timer_fired(&mut self, id: AgentId, kind: TimerKind, generation: u64) {
        if !self.timers.take_fired(id, kind, generation) {
            return;
        }
        let Some(agent) = self.registry.get_mut(id) else {
            return;
        };
        let effects = match kind {
            TimerKind::Waiting => {
                debug!("Agent {} idle after text; ending turn", id);
                transcript::end_turn(id, &mut agent.turn)
            }
            TimerKind::Permission => transcript::permission_elapsed(id, &mut agent.turn),
        };
        self.apply_effects(id, effects);
    }

    fn shutdown(&mut self) {
        info!("Closing {} agent(s)", self.registry.len());
        for id in self.registry.ids() {
            self.close_agent(id);
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for handle in self.discovery.values().chain(self.scans.values()) {
            handle.abort();
        }
    }
}
