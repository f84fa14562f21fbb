//! Agent registry - tracks live agents, focus and known transcript files

use super::{Agent, AgentId};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Registry of tracked agents plus the process-wide bookkeeping that goes
/// with them.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    /// Tracked agents, ordered by id
    agents: BTreeMap<AgentId, Agent>,
    /// Next id to hand out
    next_id: u64,
    /// The agent the user is focused on (the "active" agent)
    focused: Option<AgentId>,
    /// Rotation cursor for round-robin prompt routing
    rotation_cursor: usize,
    /// Transcript files already attributed to an agent or deliberately ignored
    known_files: HashSet<PathBuf>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Reserve a fresh id. Ids are never reused.
    pub fn allocate_id(&mut self) -> AgentId {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = AgentId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, agent: Agent) {
        if let Some(path) = agent.transcript_path() {
            self.known_files.insert(path.to_path_buf());
        }
        self.agents.insert(agent.id, agent);
    }

    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn get_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(&id)
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    /// Remove an agent. Its transcript stays in the known-files set so a
    /// later scan doesn't adopt it again.
    pub fn remove(&mut self, id: AgentId) -> Option<Agent> {
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.agents.remove(&id)
    }

    /// Agent ids in ascending order.
    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn focus(&mut self, id: AgentId) -> bool {
        if self.agents.contains_key(&id) {
            self.focused = Some(id);
            true
        } else {
            false
        }
    }

    /// Focused agent, if it is still registered.
    pub fn focused(&self) -> Option<AgentId> {
        self.focused.filter(|id| self.agents.contains_key(id))
    }

    pub fn rotation_cursor(&self) -> usize {
        self.rotation_cursor
    }

    pub fn set_rotation_cursor(&mut self, cursor: usize) {
        self.rotation_cursor = cursor;
    }

    pub fn mark_known(&mut self, path: impl Into<PathBuf>) {
        self.known_files.insert(path.into());
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.known_files.contains(path)
    }

    /// The agent currently pointed at `path`, if any.
    pub fn tailing_owner(&self, path: &Path) -> Option<AgentId> {
        self.agents
            .values()
            .find(|agent| agent.transcript_path() == Some(path))
            .map(|agent| agent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Provider, TurnState};
    use crate::process::fake::FakeProcess;
    use crate::watcher::TranscriptTail;
    use tokio::time::Instant;

    fn agent(id: AgentId, transcript: Option<&str>) -> Agent {
        Agent {
            id,
            provider: Provider::Claude,
            session_id: format!("session-{}", id),
            workdir: PathBuf::from("/work"),
            process: Box::new(FakeProcess::new()),
            transcript: transcript.map(|p| TranscriptTail::new(PathBuf::from(p))),
            transcript_seen: false,
            turn: TurnState::default(),
            spawned_at: Instant::now(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn ids_are_never_reused() {
        let mut registry = AgentRegistry::new();
        let first = registry.allocate_id();
        registry.insert(agent(first, None));
        registry.remove(first);
        let second = registry.allocate_id();
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn insert_marks_transcript_known() {
        let mut registry = AgentRegistry::new();
        let id = registry.allocate_id();
        registry.insert(agent(id, Some("/t/a.jsonl")));
        assert!(registry.is_known(Path::new("/t/a.jsonl")));
        assert_eq!(registry.tailing_owner(Path::new("/t/a.jsonl")), Some(id));

        registry.remove(id);
        assert!(registry.is_known(Path::new("/t/a.jsonl")));
        assert_eq!(registry.tailing_owner(Path::new("/t/a.jsonl")), None);
    }

    #[test]
    fn focus_cleared_when_agent_removed() {
        let mut registry = AgentRegistry::new();
        let id = registry.allocate_id();
        registry.insert(agent(id, None));
        assert!(registry.focus(id));
        assert_eq!(registry.focused(), Some(id));
        registry.remove(id);
        assert_eq!(registry.focused(), None);
        assert!(!registry.focus(id));
    }
}
