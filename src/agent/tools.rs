//! In-flight tool invocations.
//!
//! Top-level tools and the sub-tools of delegated tasks share one flat,
//! insertion-ordered list. A sub-tool points at its parent by id, so
//! dropping a task's children is a filter rather than a nested walk.

/// One running tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Display text, e.g. "Running: ls -la"
    pub status: String,
    /// Tool id of the delegated task this invocation runs under
    pub parent: Option<String>,
    /// Whether a stall of this tool may mean it is waiting for approval
    pub approval_sensitive: bool,
}

#[derive(Debug, Default)]
pub struct ToolArena {
    records: Vec<ToolInvocation>,
}

impl ToolArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new invocation. Returns false if the id is already in flight
    /// under the same parent.
    pub fn start(&mut self, invocation: ToolInvocation) -> bool {
        if self.position(&invocation.id, invocation.parent.as_deref()).is_some() {
            return false;
        }
        self.records.push(invocation);
        true
    }

    /// Stop tracking an invocation.
    pub fn finish(&mut self, id: &str, parent: Option<&str>) -> Option<ToolInvocation> {
        let index = self.position(id, parent)?;
        Some(self.records.remove(index))
    }

    pub fn get(&self, id: &str, parent: Option<&str>) -> Option<&ToolInvocation> {
        self.position(id, parent).map(|index| &self.records[index])
    }

    pub fn contains_top_level(&self, id: &str) -> bool {
        self.position(id, None).is_some()
    }

    /// Drop every sub-invocation of `parent`. Returns how many were dropped.
    pub fn clear_children(&mut self, parent: &str) -> usize {
        let before = self.records.len();
        self.records
            .retain(|record| record.parent.as_deref() != Some(parent));
        before - self.records.len()
    }

    /// Drop everything. Returns how many invocations were in flight.
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    /// Top-level invocations in start order.
    pub fn top_level(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.records.iter().filter(|record| record.parent.is_none())
    }

    pub fn children<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a ToolInvocation> {
        self.records
            .iter()
            .filter(move |record| record.parent.as_deref() == Some(parent))
    }

    /// Any approval-sensitive invocation in flight, at either level.
    pub fn has_pending_approval(&self) -> bool {
        self.records.iter().any(|record| record.approval_sensitive)
    }

    pub fn top_level_count(&self) -> usize {
        self.top_level().count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    fn position(&self, id: &str, parent: Option<&str>) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.id == id && record.parent.as_deref() == parent)
    }
}
