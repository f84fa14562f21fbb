//! Per-agent heuristic timers
//!
//! Two single-shot slots per agent: `Waiting` (text-idle turn end) and
//! `Permission` (a tool sat too long without progress). Starting a slot
//! replaces whatever was in it. A fire is delivered to the event loop as a
//! message tagged with the slot's generation; a fire that lost a race with
//! a cancel or restart carries a stale generation and is dropped.

use crate::agent::AgentId;
use crate::event::AgentEvent;
use crate::orchestrator::LoopEvent;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Waiting,
    Permission,
}

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct TimerManager {
    slots: HashMap<(AgentId, TimerKind), Slot>,
    /// Display-lag deliveries, aborted if the agent goes away first
    deferred: HashMap<AgentId, Vec<JoinHandle<()>>>,
    next_generation: u64,
    tx: UnboundedSender<LoopEvent>,
}

impl TimerManager {
    pub fn new(tx: UnboundedSender<LoopEvent>) -> Self {
        Self {
            slots: HashMap::new(),
            deferred: HashMap::new(),
            next_generation: 0,
            tx,
        }
    }

    /// Arm a slot, replacing any timer already in it.
    ///
    /// Arming `Permission` also cancels `Waiting`: once a tool is running
    /// the turn is not idle.
    pub fn start(&mut self, agent: AgentId, kind: TimerKind, delay: Duration) {
        if kind == TimerKind::Permission {
            self.cancel(agent, TimerKind::Waiting);
        }
        self.cancel(agent, kind);

        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopEvent::TimerFired { agent, kind, generation });
        });
        self.slots.insert((agent, kind), Slot { generation, handle });
    }

    /// Cancel a slot. Cancelling an empty slot is a no-op.
    pub fn cancel(&mut self, agent: AgentId, kind: TimerKind) -> bool {
        match self.slots.remove(&(agent, kind)) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel both slots and any pending display-lag deliveries.
    pub fn cancel_all(&mut self, agent: AgentId) {
        self.cancel(agent, TimerKind::Waiting);
        self.cancel(agent, TimerKind::Permission);
        if let Some(handles) = self.deferred.remove(&agent) {
            for handle in handles {
                handle.abort();
            }
        }
    }

    /// Claim a fire. True only if the slot still holds that generation; the
    /// slot is emptied.
    pub fn take_fired(&mut self, agent: AgentId, kind: TimerKind, generation: u64) -> bool {
        match self.slots.get(&(agent, kind)) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(&(agent, kind));
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, agent: AgentId, kind: TimerKind) -> bool {
        self.slots.contains_key(&(agent, kind))
    }

    /// Deliver `event` back to the loop after `delay`.
    pub fn defer(&mut self, agent: AgentId, delay: Duration, event: AgentEvent) {
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(LoopEvent::Deferred(event));
        });
        let handles = self.deferred.entry(agent).or_default();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        for slot in self.slots.values() {
            slot.handle.abort();
        }
        for handle in self.deferred.values().flatten() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    const AGENT: AgentId = AgentId(1);
    const DELAY: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn fires_once_with_current_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerManager::new(tx);
        timers.start(AGENT, TimerKind::Waiting, DELAY);

        tokio::time::sleep(DELAY * 2).await;
        let Some(LoopEvent::TimerFired { agent, kind, generation }) = rx.recv().await else {
            panic!("expected a timer fire");
        };
        assert_eq!((agent, kind), (AGENT, TimerKind::Waiting));
        assert!(timers.take_fired(agent, kind, generation));
        assert!(!timers.take_fired(agent, kind, generation));
        assert!(!timers.is_armed(AGENT, TimerKind::Waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerManager::new(tx);
        timers.start(AGENT, TimerKind::Waiting, DELAY);
        timers.start(AGENT, TimerKind::Waiting, DELAY * 3);

        tokio::time::sleep(DELAY * 2).await;
        assert!(rx.try_recv().is_err(), "replaced timer must not fire");

        tokio::time::sleep(DELAY * 2).await;
        assert!(matches!(rx.try_recv(), Ok(LoopEvent::TimerFired { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn permission_start_cancels_waiting_without_firing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerManager::new(tx);
        timers.start(AGENT, TimerKind::Waiting, DELAY);
        timers.start(AGENT, TimerKind::Permission, DELAY * 5);
        assert!(!timers.is_armed(AGENT, TimerKind::Waiting));

        tokio::time::sleep(DELAY * 2).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(DELAY * 4).await;
        match rx.try_recv() {
            Ok(LoopEvent::TimerFired { kind, .. }) => assert_eq!(kind, TimerKind::Permission),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerManager::new(tx);
        assert!(!timers.cancel(AGENT, TimerKind::Permission));
        timers.start(AGENT, TimerKind::Permission, DELAY);
        assert!(timers.cancel(AGENT, TimerKind::Permission));
        assert!(!timers.cancel(AGENT, TimerKind::Permission));
        timers.cancel_all(AGENT);

        tokio::time::sleep(DELAY * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_events_dropped_with_agent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TimerManager::new(tx);
        let event = AgentEvent::ToolDone { id: AGENT, tool_id: "t1".to_string() };
        timers.defer(AGENT, DELAY, event.clone());
        timers.defer(AgentId(2), DELAY, AgentEvent::ToolsClear { id: AgentId(2) });
        timers.cancel_all(AGENT);

        tokio::time::sleep(DELAY * 2).await;
        match rx.try_recv() {
            Ok(LoopEvent::Deferred(AgentEvent::ToolsClear { id })) => assert_eq!(id, AgentId(2)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }
}
