//! Provider-agnostic turn state machine.
//!
//! There is no reliable "model is done" signal in either dialect, so turn
//! ends come from two sources: authoritative records (`turn_duration`,
//! `task_complete`, a final answer) and the text-idle timer, which only
//! applies while no tool has run in the current turn.

use super::{is_delegation, Effects, Signal, TimerOp, ToolCall};
use crate::agent::{AgentId, AgentStatus, ToolInvocation, TurnState};
use crate::event::AgentEvent;
use crate::timers::TimerKind;

/// Apply decoded signals, in order, to one agent's turn state.
pub fn apply(id: AgentId, turn: &mut TurnState, signals: Vec<Signal>) -> Effects {
    let mut effects = Effects::default();
    for signal in signals {
        match signal {
            Signal::ToolsStarted(tools) => tools_started(id, turn, tools, &mut effects),
            Signal::ToolResults(ids) => tool_results(id, turn, ids, &mut effects),
            Signal::AssistantText => {
                if !turn.had_tool_use {
                    effects.timers.push(TimerOp::Start(TimerKind::Waiting));
                }
            }
            Signal::TurnStarted => turn_started(id, turn, &mut effects),
            Signal::TurnEnded => effects.extend(end_turn(id, turn)),
            Signal::SubToolsStarted { parent, tools } => {
                sub_tools_started(id, turn, &parent, tools, &mut effects)
            }
            Signal::SubToolResults { parent, ids } => {
                sub_tool_results(id, turn, &parent, ids, &mut effects)
            }
            Signal::ToolProgress { parent } => {
                if turn.tools.contains_top_level(&parent) && turn.tools.has_pending_approval() {
                    effects.timers.push(TimerOp::Start(TimerKind::Permission));
                }
            }
        }
    }
    effects
}

/// Authoritative end of turn: drop tool state, stop timers, report waiting.
///
/// Also what the waiting timer does when it fires.
pub fn end_turn(id: AgentId, turn: &mut TurnState) -> Effects {
    let mut effects = Effects::default();
    effects.timers.push(TimerOp::Cancel(TimerKind::Waiting));
    effects.timers.push(TimerOp::Cancel(TimerKind::Permission));
    clear_tools(id, turn, &mut effects);
    turn.is_waiting = true;
    turn.had_tool_use = false;
    turn.permission_sent = false;
    effects.events.push(AgentEvent::AgentStatus { id, status: AgentStatus::Waiting });
    effects
}

/// The permission timer elapsed with no transcript progress.
///
/// Notifies once per idle period, and only if something that could be
/// blocked on approval is still running.
pub fn permission_elapsed(id: AgentId, turn: &mut TurnState) -> Effects {
    let mut effects = Effects::default();
    if turn.permission_sent || !turn.tools.has_pending_approval() {
        return effects;
    }
    turn.permission_sent = true;
    effects.events.push(AgentEvent::PermissionNotice { id });
    effects
}

/// Drop every in-flight invocation, announcing it with one `tools-clear`.
pub fn clear_tools(id: AgentId, turn: &mut TurnState, effects: &mut Effects) {
    if turn.tools.clear() > 0 {
        effects.events.push(AgentEvent::ToolsClear { id });
    }
}

fn tools_started(id: AgentId, turn: &mut TurnState, tools: Vec<ToolCall>, effects: &mut Effects) {
    effects.timers.push(TimerOp::Cancel(TimerKind::Waiting));
    turn.is_waiting = false;
    turn.had_tool_use = true;

    let mut arm_permission = false;
    for call in tools {
        arm_permission |= call.approval_sensitive;
        let started = turn.tools.start(ToolInvocation {
            id: call.id.clone(),
            name: call.name,
            status: call.status.clone(),
            parent: None,
            approval_sensitive: call.approval_sensitive,
        });
        if started {
            effects.events.push(AgentEvent::ToolStart { id, tool_id: call.id, status: call.status });
        }
    }

    if arm_permission {
        effects.timers.push(TimerOp::Start(TimerKind::Permission));
    }
    effects.events.push(AgentEvent::AgentStatus { id, status: AgentStatus::Active });
}

fn tool_results(id: AgentId, turn: &mut TurnState, ids: Vec<String>, effects: &mut Effects) {
    for tool_id in ids {
        let Some(finished) = turn.tools.finish(&tool_id, None) else {
            continue;
        };
        if is_delegation(&finished.name) {
            turn.tools.clear_children(&tool_id);
            effects.events.push(AgentEvent::SubagentClear { id, parent_tool_id: tool_id.clone() });
        }
        effects.deferred.push(AgentEvent::ToolDone { id, tool_id });
    }

    if turn.tools.top_level_count() == 0 {
        // Nothing left in flight: a text-only reply may now end the turn.
        turn.had_tool_use = false;
    } else if turn.tools.has_pending_approval() {
        effects.timers.push(TimerOp::Start(TimerKind::Permission));
    }
}

fn turn_started(id: AgentId, turn: &mut TurnState, effects: &mut Effects) {
    effects.timers.push(TimerOp::Cancel(TimerKind::Waiting));
    effects.timers.push(TimerOp::Cancel(TimerKind::Permission));
    clear_tools(id, turn, effects);
    turn.had_tool_use = false;
    turn.permission_sent = false;
    turn.is_waiting = false;
    effects.events.push(AgentEvent::AgentStatus { id, status: AgentStatus::Active });
}

fn sub_tools_started(
    id: AgentId,
    turn: &mut TurnState,
    parent: &str,
    tools: Vec<ToolCall>,
    effects: &mut Effects,
) {
    let parent_is_task = turn
        .tools
        .get(parent, None)
        .is_some_and(|record| is_delegation(&record.name));
    if !parent_is_task {
        return;
    }

    let mut arm_permission = false;
    for call in tools {
        arm_permission |= call.approval_sensitive;
        let started = turn.tools.start(ToolInvocation {
            id: call.id.clone(),
            name: call.name,
            status: call.status.clone(),
            parent: Some(parent.to_string()),
            approval_sensitive: call.approval_sensitive,
        });
        if started {
            effects.events.push(AgentEvent::SubagentToolStart {
                id,
                parent_tool_id: parent.to_string(),
                tool_id: call.id,
                status: call.status,
            });
        }
    }

    if arm_permission {
        effects.timers.push(TimerOp::Start(TimerKind::Permission));
    }
}

fn sub_tool_results(
    id: AgentId,
    turn: &mut TurnState,
    parent: &str,
    ids: Vec<String>,
    effects: &mut Effects,
) {
    for tool_id in ids {
        if turn.tools.finish(&tool_id, Some(parent)).is_some() {
            effects.deferred.push(AgentEvent::SubagentToolDone {
                id,
                parent_tool_id: parent.to_string(),
                tool_id,
            });
        }
    }
    if turn.tools.has_pending_approval() {
        effects.timers.push(TimerOp::Start(TimerKind::Permission));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Provider;
    use crate::transcript::process_line;

    const ID: AgentId = AgentId(7);

    fn claude(turn: &mut TurnState, line: &str) -> Effects {
        process_line(ID, Provider::Claude, turn, line)
    }

    fn codex(turn: &mut TurnState, line: &str) -> Effects {
        process_line(ID, Provider::Codex, turn, line)
    }

    const BASH_T1: &str = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls -la"}}]}}"#;
    const RESULT_T1: &str = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1"}]}}"#;
    const TEXT: &str = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"All done."}]}}"#;

    #[test]
    fn tool_use_emits_tool_start_then_active() {
        let mut turn = TurnState::default();
        let effects = claude(&mut turn, BASH_T1);
        assert_eq!(
            effects.events,
            vec![
                AgentEvent::ToolStart { id: ID, tool_id: "t1".to_string(), status: "Running: ls -la".to_string() },
                AgentEvent::AgentStatus { id: ID, status: AgentStatus::Active },
            ]
        );
        assert_eq!(
            effects.timers,
            vec![TimerOp::Cancel(TimerKind::Waiting), TimerOp::Start(TimerKind::Permission)]
        );
        assert!(turn.had_tool_use);
        assert!(turn.tools.contains_top_level("t1"));
    }

    #[test]
    fn tool_result_removes_immediately_and_defers_done() {
        let mut turn = TurnState::default();
        claude(&mut turn, BASH_T1);
        let effects = claude(&mut turn, RESULT_T1);

        assert!(!turn.tools.contains_top_level("t1"));
        assert!(effects.events.is_empty());
        assert_eq!(
            effects.deferred,
            vec![AgentEvent::ToolDone { id: ID, tool_id: "t1".to_string() }]
        );
        // last tool finished, so the text-idle heuristic applies again
        assert!(!turn.had_tool_use);
    }

    #[test]
    fn unknown_result_is_ignored() {
        let mut turn = TurnState::default();
        let effects = claude(&mut turn, RESULT_T1);
        assert!(effects.is_empty());
    }

    #[test]
    fn text_only_answer_arms_waiting_timer_only_without_tool_use() {
        let mut turn = TurnState::default();
        let effects = claude(&mut turn, TEXT);
        assert_eq!(effects.timers, vec![TimerOp::Start(TimerKind::Waiting)]);

        claude(&mut turn, BASH_T1);
        let effects = claude(&mut turn, TEXT);
        assert!(effects.timers.is_empty(), "narration between tool calls must not end the turn");
    }

    #[test]
    fn second_tool_still_running_rearms_permission() {
        let mut turn = TurnState::default();
        let two = r#"{"type":"assistant","message":{"content":[
            {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"make"}},
            {"type":"tool_use","id":"t2","name":"Bash","input":{"command":"make test"}}]}}"#
            .replace('\n', "");
        claude(&mut turn, &two);
        let effects = claude(&mut turn, RESULT_T1);
        assert_eq!(effects.timers, vec![TimerOp::Start(TimerKind::Permission)]);
        assert!(turn.had_tool_use);
    }

    #[test]
    fn new_prompt_clears_everything() {
        let mut turn = TurnState::default();
        claude(&mut turn, BASH_T1);
        turn.permission_sent = true;

        let effects = claude(&mut turn, r#"{"type":"user","message":{"content":"now run the tests"}}"#);
        assert_eq!(
            effects.events,
            vec![
                AgentEvent::ToolsClear { id: ID },
                AgentEvent::AgentStatus { id: ID, status: AgentStatus::Active },
            ]
        );
        assert!(effects.timers.contains(&TimerOp::Cancel(TimerKind::Waiting)));
        assert!(turn.tools.is_empty());
        assert!(!turn.had_tool_use);
        assert!(!turn.permission_sent);
    }

    #[test]
    fn turn_duration_transitions_to_waiting() {
        let mut turn = TurnState::default();
        claude(&mut turn, BASH_T1);
        let effects = claude(&mut turn, r#"{"type":"system","subtype":"turn_duration","durationMs":900}"#);
        assert_eq!(
            effects.events,
            vec![
                AgentEvent::ToolsClear { id: ID },
                AgentEvent::AgentStatus { id: ID, status: AgentStatus::Waiting },
            ]
        );
        assert!(turn.is_waiting);
        assert!(turn.tools.is_empty());
    }

    #[test]
    fn permission_notice_sent_once_per_idle_period() {
        let mut turn = TurnState::default();
        claude(&mut turn, BASH_T1);
        assert_eq!(permission_elapsed(ID, &mut turn).events, vec![AgentEvent::PermissionNotice { id: ID }]);
        assert!(permission_elapsed(ID, &mut turn).events.is_empty());
    }

    #[test]
    fn exempt_tool_never_needs_permission() {
        let mut turn = TurnState::default();
        let effects = claude(
            &mut turn,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"q1","name":"AskUserQuestion","input":{}}]}}"#,
        );
        assert!(!effects.timers.contains(&TimerOp::Start(TimerKind::Permission)));
        assert!(permission_elapsed(ID, &mut turn).is_empty());
        // still announced so the UI can show it
        assert!(matches!(effects.events[0], AgentEvent::ToolStart { .. }));
    }

    #[test]
    fn delegated_task_tracks_sub_tools() {
        let mut turn = TurnState::default();
        claude(
            &mut turn,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"task","name":"Task","input":{"description":"Scan repo"}}]}}"#,
        );
        let sub_start = r#"{"type":"progress","parentToolUseID":"task","data":{"type":"agent_progress","message":{"type":"assistant","message":{"content":[{"type":"tool_use","id":"s1","name":"Grep","input":{}}]}}}}"#;
        let effects = claude(&mut turn, sub_start);
        assert_eq!(
            effects.events,
            vec![AgentEvent::SubagentToolStart {
                id: ID,
                parent_tool_id: "task".to_string(),
                tool_id: "s1".to_string(),
                status: "Searching code".to_string(),
            }]
        );
        assert_eq!(effects.timers, vec![TimerOp::Start(TimerKind::Permission)]);
        assert!(turn.tools.has_pending_approval());

        // the task finishing drops its children with it
        let effects = claude(
            &mut turn,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"task"}]}}"#,
        );
        assert_eq!(
            effects.events,
            vec![AgentEvent::SubagentClear { id: ID, parent_tool_id: "task".to_string() }]
        );
        assert_eq!(effects.deferred, vec![AgentEvent::ToolDone { id: ID, tool_id: "task".to_string() }]);
        assert!(turn.tools.is_empty());
    }

    #[test]
    fn progress_under_unknown_parent_ignored() {
        let mut turn = TurnState::default();
        let sub_start = r#"{"type":"progress","parentToolUseID":"nope","data":{"type":"agent_progress","message":{"type":"assistant","message":{"content":[{"type":"tool_use","id":"s1","name":"Grep","input":{}}]}}}}"#;
        assert!(claude(&mut turn, sub_start).is_empty());
        assert!(turn.tools.is_empty());
    }

    #[test]
    fn codex_exec_command_arms_permission() {
        let mut turn = TurnState::default();
        let effects = codex(
            &mut turn,
            r#"{"type":"response_item","payload":{"type":"function_call","call_id":"c1","name":"exec_command","arguments":"{\"cmd\":\"pytest\"}"}}"#,
        );
        assert_eq!(
            effects.events[0],
            AgentEvent::ToolStart { id: ID, tool_id: "c1".to_string(), status: "Running: pytest".to_string() }
        );
        assert!(effects.timers.contains(&TimerOp::Start(TimerKind::Permission)));

        let effects = codex(
            &mut turn,
            r#"{"type":"response_item","payload":{"type":"function_call_output","call_id":"c1","output":"ok"}}"#,
        );
        assert_eq!(effects.deferred, vec![AgentEvent::ToolDone { id: ID, tool_id: "c1".to_string() }]);
    }

    #[test]
    fn codex_final_answer_and_task_complete_end_turn() {
        let mut turn = TurnState::default();
        let effects = codex(
            &mut turn,
            r#"{"type":"response_item","payload":{"type":"message","role":"assistant","phase":"final_answer","content":[]}}"#,
        );
        assert!(turn.is_waiting);
        assert_eq!(
            effects.events,
            vec![AgentEvent::AgentStatus { id: ID, status: AgentStatus::Waiting }]
        );

        codex(&mut turn, r#"{"type":"event_msg","payload":{"type":"user_message","message":"again"}}"#);
        assert!(!turn.is_waiting);
        codex(&mut turn, r#"{"type":"event_msg","payload":{"type":"task_complete"}}"#);
        assert!(turn.is_waiting);
    }

    #[test]
    fn every_tracked_tool_was_announced() {
        let lines = [
            BASH_T1,
            BASH_T1, // duplicate id, must not be announced twice
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t2","name":"Read","input":{"file_path":"/x/y"}}]}}"#,
            RESULT_T1,
        ];
        let mut turn = TurnState::default();
        let mut announced = Vec::new();
        let mut done = Vec::new();
        for line in lines {
            let effects = claude(&mut turn, line);
            for event in effects.events.into_iter().chain(effects.deferred) {
                match event {
                    AgentEvent::ToolStart { tool_id, .. } => announced.push(tool_id),
                    AgentEvent::ToolDone { tool_id, .. } => done.push(tool_id),
                    _ => {}
                }
            }
        }
        assert_eq!(announced, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(done, vec!["t1".to_string()]);
        for tool in turn.tools.top_level() {
            assert!(announced.contains(&tool.id) && !done.contains(&tool.id));
        }
    }

    fn sub_agent_line(parent: &str, role: &str, block: &str) -> String {
        format!(
            r#"{{"type":"progress","parentToolUseID":"{}","data":{{"type":"agent_progress","message":{{"type":"{}","message":{{"content":[{}]}}}}}}}}"#,
            parent, role, block
        )
    }

    #[test]
    fn sub_tool_results_defer_done_and_rearm_permission() {
        let mut turn = TurnState::default();
        claude(
            &mut turn,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"task","name":"Task","input":{"description":"Audit"}}]}}"#,
        );
        claude(&mut turn, &sub_agent_line("task", "assistant", r#"{"type":"tool_use","id":"s1","name":"Grep","input":{}}"#));
        claude(&mut turn, &sub_agent_line("task", "assistant", r#"{"type":"tool_use","id":"s2","name":"Bash","input":{"command":"ls"}}"#));

        let effects = claude(&mut turn, &sub_agent_line("task", "user", r#"{"type":"tool_result","tool_use_id":"s1"}"#));
        assert!(effects.events.is_empty());
        assert_eq!(
            effects.deferred,
            vec![AgentEvent::SubagentToolDone {
                id: ID,
                parent_tool_id: "task".to_string(),
                tool_id: "s1".to_string(),
            }]
        );
        // s2 may still be blocked on approval
        assert_eq!(effects.timers, vec![TimerOp::Start(TimerKind::Permission)]);

        // a result filed under the wrong parent closes nothing
        let effects = claude(&mut turn, &sub_agent_line("other", "user", r#"{"type":"tool_result","tool_use_id":"s2"}"#));
        assert!(effects.deferred.is_empty());

        let effects = claude(&mut turn, &sub_agent_line("task", "user", r#"{"type":"tool_result","tool_use_id":"s2"}"#));
        assert_eq!(effects.deferred.len(), 1);
        assert!(effects.timers.is_empty(), "only the exempt task is left");
        assert_eq!(turn.tools.len(), 1);
        assert!(!turn.tools.has_pending_approval());
    }

    #[test]
    fn tool_progress_rearms_permission_for_running_tool() {
        let mut turn = TurnState::default();
        claude(&mut turn, BASH_T1);

        let effects = claude(&mut turn, r#"{"type":"progress","parentToolUseID":"t1","data":{"type":"bash_progress"}}"#);
        assert!(effects.events.is_empty());
        assert_eq!(effects.timers, vec![TimerOp::Start(TimerKind::Permission)]);

        let effects = claude(&mut turn, r#"{"type":"progress","parentToolUseID":"zz","data":{"type":"mcp_progress"}}"#);
        assert!(effects.is_empty());

        claude(&mut turn, RESULT_T1);
        let effects = claude(&mut turn, r#"{"type":"progress","parentToolUseID":"t1","data":{"type":"bash_progress"}}"#);
        assert!(effects.is_empty(), "finished tool no longer counts");
    }

    #[test]
    fn tool_progress_under_exempt_tool_arms_nothing() {
        let mut turn = TurnState::default();
        claude(
            &mut turn,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"q1","name":"AskUserQuestion","input":{}}]}}"#,
        );
        let effects = claude(&mut turn, r#"{"type":"progress","parentToolUseID":"q1","data":{"type":"mcp_progress"}}"#);
        assert!(effects.is_empty());
    }
}
