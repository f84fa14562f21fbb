//! Prompt routing and cross-agent relay.

use super::Orchestrator;
use crate::agent::{Agent, AgentId, AgentRegistry, AgentStatus, Provider};
use crate::event::{AgentEvent, Route};
use crate::VigilError;
use tracing::info;

/// Agents an inbound prompt goes to.
///
/// Round-robin walks the agents in id order from the registry's rotation
/// cursor and focuses the one it picks.
pub fn select_targets(registry: &mut AgentRegistry, route: Route) -> Vec<AgentId> {
    let ids = registry.ids();
    if ids.is_empty() {
        return Vec::new();
    }
    match route {
        Route::Broadcast => ids,
        Route::RoundRobin => {
            let index = registry.rotation_cursor() % ids.len();
            registry.set_rotation_cursor(index + 1);
            let target = ids[index];
            registry.focus(target);
            vec![target]
        }
        Route::Active => preferred_agent(registry).into_iter().collect(),
    }
}

/// The agent a prompt without an explicit target should go to: the
/// focused one, else the first waiting for input, else the first with no
/// tools in flight, else the newest.
pub fn preferred_agent(registry: &AgentRegistry) -> Option<AgentId> {
    registry
        .focused()
        .or_else(|| registry.agents().find(|agent| agent.turn.is_waiting).map(|agent| agent.id))
        .or_else(|| registry.agents().find(|agent| agent.turn.tools.is_empty()).map(|agent| agent.id))
        .or_else(|| registry.ids().last().copied())
}

/// Plain-text status of `agent` for pasting into another agent.
pub fn relay_summary(agent: &Agent, note: Option<&str>) -> String {
    let status = match agent.status() {
        AgentStatus::Waiting => "waiting for input",
        AgentStatus::Active => "active",
    };
    let transcript = agent
        .transcript_path()
        .and_then(|path| path.file_name())
        .map_or_else(|| "(pending)".to_string(), |name| name.to_string_lossy().into_owned());

    let mut lines = vec![
        format!("[team sync] Agent {} ({}) is {}.", agent.id, agent.provider, status),
        format!("Working dir: {}", agent.workdir.display()),
        format!("Transcript: {}", transcript),
    ];
    let tools: Vec<&str> = agent.turn.tools.top_level().map(|tool| tool.status.as_str()).collect();
    if tools.is_empty() {
        lines.push("Active tools: none".to_string());
    } else {
        lines.push("Active tools:".to_string());
        lines.extend(tools.iter().map(|status| format!("- {}", status)));
    }
    if let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) {
        lines.push(format!("Note: {}", note));
    }
    lines.join("\n")
}

impl Orchestrator {
    /// Route a prompt. With no agents at all, spawn one and hand it the
    /// prompt once it's up.
    pub(super) fn send_prompt(&mut self, text: String, route: Route, provider: Option<Provider>) {
        if self.registry.is_empty() {
            info!("No agents running; spawning one for the prompt");
            self.spawn_agent(provider, None, Some(text));
            return;
        }
        for id in select_targets(&mut self.registry, route) {
            self.deliver_prompt(id, &text);
        }
    }

    /// Paste a status summary of `source` into one agent, or into all the
    /// others when no target is given.
    pub(super) fn relay(&mut self, source: AgentId, target: Option<AgentId>, note: Option<String>) {
        let Some(agent) = self.registry.get(source) else {
            self.emit_error(VigilError::AgentNotFound(source));
            return;
        };
        let summary = relay_summary(agent, note.as_deref());

        let targets: Vec<AgentId> = match target {
            Some(id) if id == source => Vec::new(),
            Some(id) if !self.registry.contains(id) => {
                self.emit_error(VigilError::AgentNotFound(id));
                return;
            }
            Some(id) => vec![id],
            None => self.registry.ids().into_iter().filter(|id| *id != source).collect(),
        };
        if targets.is_empty() {
            self.emit(AgentEvent::Error {
                message: format!("No agent to relay agent {}'s status to", source),
            });
            return;
        }

        let delivered: Vec<AgentId> = targets
            .into_iter()
            .filter(|id| self.deliver_prompt(*id, &summary))
            .collect();
        info!("Relayed agent {} status to {:?}", source, delivered);
        self.emit(AgentEvent::TeamSync { source_id: source, targets: delivered });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolInvocation;
    use std::path::PathBuf;

    fn registry_with(ids: &[u64]) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for &id in ids {
            registry.insert(Agent::stub(AgentId(id), Provider::Claude, PathBuf::from("/work")));
        }
        registry
    }

    #[test]
    fn round_robin_walks_ids_in_order() {
        let mut registry = registry_with(&[3, 5, 9]);
        assert_eq!(select_targets(&mut registry, Route::RoundRobin), vec![AgentId(3)]);
        assert_eq!(select_targets(&mut registry, Route::RoundRobin), vec![AgentId(5)]);
        assert_eq!(registry.rotation_cursor(), 2);
        assert_eq!(registry.focused(), Some(AgentId(5)));
        assert_eq!(select_targets(&mut registry, Route::RoundRobin), vec![AgentId(9)]);
        assert_eq!(select_targets(&mut registry, Route::RoundRobin), vec![AgentId(3)]);
    }

    #[test]
    fn round_robin_survives_removal() {
        let mut registry = registry_with(&[1, 2, 3]);
        registry.set_rotation_cursor(2);
        registry.remove(AgentId(3));
        assert_eq!(select_targets(&mut registry, Route::RoundRobin), vec![AgentId(1)]);
    }

    #[test]
    fn broadcast_hits_everyone() {
        let mut registry = registry_with(&[1, 2]);
        assert_eq!(select_targets(&mut registry, Route::Broadcast), vec![AgentId(1), AgentId(2)]);
        assert!(select_targets(&mut registry_with(&[]), Route::Broadcast).is_empty());
    }

    #[test]
    fn active_route_preference_order() {
        let mut registry = registry_with(&[1, 2, 3]);
        for id in [1, 2, 3] {
            let agent = registry.get_mut(AgentId(id)).unwrap();
            agent.turn.tools.start(ToolInvocation {
                id: format!("t{}", id),
                name: "Bash".to_string(),
                status: "Running: make".to_string(),
                parent: None,
                approval_sensitive: true,
            });
        }
        // everyone busy, nothing focused: newest
        assert_eq!(preferred_agent(&registry), Some(AgentId(3)));

        registry.get_mut(AgentId(2)).unwrap().turn.tools.clear();
        assert_eq!(preferred_agent(&registry), Some(AgentId(2)));

        registry.get_mut(AgentId(3)).unwrap().turn.is_waiting = true;
        assert_eq!(preferred_agent(&registry), Some(AgentId(3)));

        registry.focus(AgentId(1));
        assert_eq!(select_targets(&mut registry, Route::Active), vec![AgentId(1)]);
    }

    #[test]
    fn relay_summary_lists_tools_and_note() {
        let mut agent = Agent::stub(AgentId(4), Provider::Codex, PathBuf::from("/work/app"));
        agent.turn.tools.start(ToolInvocation {
            id: "c1".to_string(),
            name: "exec_command".to_string(),
            status: "Running: cargo test".to_string(),
            parent: None,
            approval_sensitive: true,
        });

        let summary = relay_summary(&agent, Some("please review"));
        assert_eq!(
            summary,
            "[team sync] Agent 4 (codex) is active.\n\
             Working dir: /work/app\n\
             Transcript: (pending)\n\
             Active tools:\n\
             - Running: cargo test\n\
             Note: please review"
        );

        agent.turn.tools.clear();
        agent.turn.is_waiting = true;
        let idle = relay_summary(&agent, Some("  "));
        assert!(idle.contains("is waiting for input."));
        assert!(idle.ends_with("Active tools: none"));
    }
}
