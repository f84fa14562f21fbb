//! Transcript discovery, tailing, reassignment and project scans.

use super::{LoopEvent, Orchestrator, ScanKey};
use crate::agent::{Agent, AgentId, Provider};
use crate::event::AgentEvent;
use crate::timers::TimerKind;
use crate::transcript::{self, machine, Effects, TimerOp};
use crate::watcher::scan::{self, SCAN_LOOKBACK_DAYS, SEARCH_LOOKBACK_DAYS};
use crate::watcher::{ticker, FileWatch, TranscriptTail};
use chrono::{TimeDelta, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Filesystem timestamps can trail the wall clock by up to this much.
const MTIME_SLACK_SECS: i64 = 1;

impl Orchestrator {
    pub(super) fn start_discovery(&mut self, id: AgentId) {
        if self.discovery.contains_key(&id) {
            return;
        }
        let handle = ticker(self.config.timings.discovery_interval, self.tx.clone(), move || {
            LoopEvent::DiscoveryTick(id)
        });
        self.discovery.insert(id, handle);
    }

    pub(super) fn stop_discovery(&mut self, id: AgentId) {
        if let Some(handle) = self.discovery.remove(&id) {
            handle.abort();
        }
    }

    /// A spawned agent has no live transcript yet. Claude's path is known
    /// up front, so wait for the file; for codex look for a fresh rollout
    /// file nobody else owns.
    pub(super) fn discover_transcript(&mut self, id: AgentId) {
        let Some(agent) = self.registry.get(id) else {
            self.stop_discovery(id);
            return;
        };
        let (expected_exists, discovered) = match agent.transcript_path() {
            Some(path) => (path.exists(), None),
            None => (false, self.find_new_transcript(agent)),
        };

        if expected_exists {
            self.stop_discovery(id);
            self.begin_tailing(id);
        } else if let Some(path) = discovered {
            self.stop_discovery(id);
            info!("Discovered transcript {} for agent {}", path.display(), id);
            self.reassign(id, path);
        }
    }

    fn find_new_transcript(&self, agent: &Agent) -> Option<PathBuf> {
        let since = agent.created_at - TimeDelta::seconds(MTIME_SLACK_SECS);
        let root = self.config.transcript_root(agent.provider);
        let candidates = scan::list_transcripts(root, agent.provider, &agent.workdir, SCAN_LOOKBACK_DAYS)
            .into_iter()
            .filter(|path| !self.registry.is_known(path))
            .filter(|path| scan::modified(path).is_some_and(|mtime| mtime >= since));
        scan::newest(candidates)
    }

    /// Watch the agent's transcript and consume whatever is already there.
    /// Falls back to discovery polling if the file doesn't exist yet.
    pub(super) fn begin_tailing(&mut self, id: AgentId) {
        let Some(path) = self
            .registry
            .get(id)
            .and_then(|agent| agent.transcript_path())
            .map(Path::to_path_buf)
        else {
            return;
        };
        if !path.exists() {
            self.start_discovery(id);
            return;
        }

        if let Some(agent) = self.registry.get_mut(id) {
            agent.transcript_seen = true;
        }
        let watch = FileWatch::start(id, &path, self.config.timings.tail_poll_interval, self.tx.clone());
        self.watches.insert(id, watch);
        info!("Tailing {} for agent {}", path.display(), id);

        self.read_transcript(id);
    }

    /// Read and process whatever the transcript gained since last time.
    ///
    /// Any new data is progress: both timers are cancelled, a pending
    /// permission notice is withdrawn and a heartbeat goes out before the
    /// lines themselves are applied.
    pub(super) fn read_transcript(&mut self, id: AgentId) {
        let Some(agent) = self.registry.get_mut(id) else {
            return;
        };
        let provider = agent.provider;
        let Some(tail) = agent.transcript.as_mut() else {
            return;
        };
        let already_failing = tail.is_failing();
        let lines = match tail.read_new_lines() {
            Ok(lines) => lines,
            // one warning per failure streak; polling retries every second
            Err(e) if already_failing => {
                debug!("Transcript read for agent {} still failing: {}", id, e);
                return;
            }
            Err(e) => {
                warn!("Transcript read for agent {} failed: {}", id, e);
                return;
            }
        };
        if lines.is_empty() {
            return;
        }
        agent.transcript_seen = true;

        let mut effects = Effects::default();
        effects.timers.push(TimerOp::Cancel(TimerKind::Waiting));
        effects.timers.push(TimerOp::Cancel(TimerKind::Permission));
        if agent.turn.permission_sent {
            agent.turn.permission_sent = false;
            effects.events.push(AgentEvent::PermissionClear { id });
        }
        effects.events.push(AgentEvent::Heartbeat {
            id,
            timestamp: Utc::now().timestamp_millis(),
        });
        for line in &lines {
            effects.extend(transcript::process_line(id, provider, &mut agent.turn, line));
        }

        self.apply_effects(id, effects);
    }

    /// Point an agent at a different transcript file.
    ///
    /// In-flight tool state is dropped (one `tools-clear`), the provider is
    /// re-inferred from the file name and tailing restarts at offset 0.
    /// Refused if another agent already tails `path`; a no-op if the agent
    /// already follows it.
    pub(super) fn reassign(&mut self, id: AgentId, path: PathBuf) -> bool {
        let current = self.registry.get(id).and_then(|agent| agent.transcript_path());
        if current == Some(path.as_path()) {
            debug!("Agent {} already follows {}", id, path.display());
            return true;
        }
        if let Some(owner) = self.registry.tailing_owner(&path) {
            if owner != id {
                warn!("Not reassigning {} to agent {}: agent {} tails it", path.display(), id, owner);
                return false;
            }
        }
        if !self.registry.contains(id) {
            return false;
        }

        self.watches.remove(&id);
        self.stop_discovery(id);
        // display-lag deliveries still go out; they close tools the old file finished
        self.timers.cancel(id, TimerKind::Waiting);
        self.timers.cancel(id, TimerKind::Permission);

        let mut effects = Effects::default();
        if let Some(agent) = self.registry.get_mut(id) {
            machine::clear_tools(id, &mut agent.turn, &mut effects);
            agent.turn.had_tool_use = false;
            if agent.turn.permission_sent {
                agent.turn.permission_sent = false;
                effects.events.push(AgentEvent::PermissionClear { id });
            }
            agent.provider = Provider::infer_from_path(&path);
            agent.transcript = Some(TranscriptTail::new(path.clone()));
        }
        info!("Agent {} now follows {}", id, path.display());
        self.registry.mark_known(path);
        self.apply_effects(id, effects);

        self.begin_tailing(id);
        true
    }

    /// Re-attach an agent to its transcript on request.
    ///
    /// If the current file exists the tail restarts from where it was.
    /// Otherwise the newest matching file not owned by another agent is
    /// adopted. With no candidate the agent is left untouched.
    pub(super) fn resync(&mut self, id: AgentId) {
        let Some(agent) = self.registry.get(id) else {
            self.emit(AgentEvent::ResyncResult {
                id,
                ok: false,
                reason: Some(format!("no agent with id {}", id)),
            });
            return;
        };

        if agent.transcript_path().is_some_and(Path::exists) {
            self.watches.remove(&id);
            self.stop_discovery(id);
            self.begin_tailing(id);
            self.emit(AgentEvent::ResyncResult { id, ok: true, reason: None });
            return;
        }

        let provider = agent.provider;
        let workdir = agent.workdir.clone();
        let candidates: Vec<PathBuf> = scan::list_transcripts(
            self.config.transcript_root(provider),
            provider,
            &workdir,
            SEARCH_LOOKBACK_DAYS,
        )
        .into_iter()
        .filter(|path| self.registry.tailing_owner(path).is_none_or(|owner| owner == id))
        .collect();

        let result = match scan::newest(candidates) {
            Some(path) => {
                if self.reassign(id, path.clone()) {
                    AgentEvent::ResyncResult { id, ok: true, reason: None }
                } else {
                    AgentEvent::ResyncResult {
                        id,
                        ok: false,
                        reason: Some(format!("{} is tailed by another agent", path.display())),
                    }
                }
            }
            None => {
                let reason = format!("no {} transcript found for {}", provider, workdir.display());
                warn!("Resync of agent {} failed: {}", id, reason);
                AgentEvent::ResyncResult { id, ok: false, reason: Some(reason) }
            }
        };
        self.emit(result);
    }

    /// Start scanning a project directory, unless already scanning it.
    /// Files already present are marked known and never adopted.
    pub(super) fn ensure_scan(&mut self, key: ScanKey) {
        if self.scans.contains_key(&key) {
            return;
        }
        let root = self.config.transcript_root(key.provider);
        for path in scan::list_transcripts(root, key.provider, &key.workdir, SCAN_LOOKBACK_DAYS) {
            self.registry.mark_known(path);
        }

        let tick_key = key.clone();
        let handle = ticker(self.config.timings.project_scan_interval, self.tx.clone(), move || {
            LoopEvent::ProjectScan(tick_key.clone())
        });
        debug!("Scanning {} transcripts for {}", key.provider, key.workdir.display());
        self.scans.insert(key, handle);
    }

    fn scan_in_use(&self, key: &ScanKey) -> bool {
        self.registry
            .agents()
            .any(|agent| agent.provider == key.provider && agent.workdir == key.workdir)
    }

    /// Stop a scan nobody needs any more.
    pub(super) fn release_scan(&mut self, key: &ScanKey) {
        if self.scan_in_use(key) {
            return;
        }
        if let Some(handle) = self.scans.remove(key) {
            handle.abort();
            debug!("Stopped scanning {}", key.workdir.display());
        }
    }

    /// Hand new transcript files in a project directory to an agent: first
    /// to one still waiting for its transcript, otherwise to the focused
    /// agent when provider and directory match. Anything else is left for
    /// the next cycle.
    pub(super) fn scan_project(&mut self, key: &ScanKey) {
        if !self.scan_in_use(key) {
            self.release_scan(key);
            return;
        }

        let root = self.config.transcript_root(key.provider);
        let mut fresh: Vec<PathBuf> = scan::list_transcripts(root, key.provider, &key.workdir, SCAN_LOOKBACK_DAYS)
            .into_iter()
            .filter(|path| !self.registry.is_known(path))
            .collect();
        scan::sort_by_mtime(&mut fresh);

        for path in fresh {
            let provider = Provider::infer_from_path(&path);
            let matches = |agent: &Agent| agent.provider == provider && agent.workdir == key.workdir;

            let pending = self
                .registry
                .agents()
                .find(|agent| agent.transcript.is_none() && matches(agent))
                .map(|agent| agent.id);
            let target = pending.or_else(|| {
                self.registry
                    .focused()
                    .filter(|id| self.registry.get(*id).is_some_and(matches))
            });

            match target {
                Some(id) => {
                    info!("Adopting new transcript {} into agent {}", path.display(), id);
                    self.reassign(id, path);
                }
                None => debug!("No agent for new transcript {}", path.display()),
            }
        }
    }
}
