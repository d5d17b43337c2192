use crate::journal::{self, JournalError, NewNode, SharedJournal};
use actiontree_core::{ActionNode, NodeId, NodeKind, TraceId, TraceInfo};
use anyhow::Result;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const DEFAULT_TRACE_NAME: &str = "Agent Trace";
const DEFAULT_TRACE_DESCRIPTION: &str = "Trace of agent actions";

/// One agent step, read as a JSON line.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AgentCommand {
    StartTrace {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    LogStep {
        step_name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parent_id: Option<NodeId>,
    },
    MarkDecision {
        decision_point: String,
        #[serde(default)]
        options: Vec<String>,
        chosen_option: String,
        #[serde(default)]
        reasoning: String,
        #[serde(default)]
        parent_id: Option<NodeId>,
    },
    LogToolCall {
        tool_name: String,
        #[serde(default)]
        arguments: serde_json::Value,
        #[serde(default)]
        result: String,
        #[serde(default)]
        parent_id: Option<NodeId>,
    },
    Terminate {
        label: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        parent_id: Option<NodeId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Trace(TraceInfo),
    Node(ActionNode),
}

/// Turns agent steps into journal entries and publishes new nodes.
pub struct Session {
    journal: SharedJournal,
    bus: broadcast::Sender<ActionNode>,
    current: Option<TraceId>,
}

impl Session {
    pub fn new(journal: SharedJournal, bus: broadcast::Sender<ActionNode>) -> Self {
        Self {
            journal,
            bus,
            current: None,
        }
    }

    pub fn current_trace(&self) -> Option<&TraceId> {
        self.current.as_ref()
    }

    pub fn apply(&mut self, cmd: AgentCommand) -> Result<Applied, JournalError> {
        let (kind, label, parent_id) = match &cmd {
            AgentCommand::StartTrace { name, description } => {
                let info = journal::lock(&self.journal).create_trace(name, description.as_deref());
                tracing::info!(trace_id = %info.id, name = %info.name, "trace started");
                self.current = Some(info.id.clone());
                return Ok(Applied::Trace(info));
            }
            AgentCommand::LogStep { step_name, parent_id, .. } => (NodeKind::Logging, step_name.clone(), parent_id),
            AgentCommand::MarkDecision {
                decision_point,
                parent_id,
                ..
            } => (NodeKind::Decision, decision_point.clone(), parent_id),
            AgentCommand::LogToolCall { tool_name, parent_id, .. } => {
                (NodeKind::ToolCall, format!("Tool Call: {tool_name}"), parent_id)
            }
            AgentCommand::Terminate { label, parent_id, .. } => (NodeKind::Terminal, label.clone(), parent_id),
        };

        let trace_id = self.trace_or_default();
        let mut input = NewNode::new(trace_id.clone(), kind, label);
        input.parent_id = match parent_id {
            Some(p) => Some(p.clone()),
            None => journal::lock(&self.journal).cursor(&trace_id).cloned(),
        };
        match cmd {
            AgentCommand::LogStep { description, .. } => {
                input.content = description;
                input.log_level = Some("INFO".into());
            }
            AgentCommand::MarkDecision {
                options,
                chosen_option,
                reasoning,
                ..
            } => {
                input.content = Some(format!("Options: {}\nReasoning: {reasoning}", options.join(", ")));
                input.decision_outcome = Some(chosen_option);
            }
            AgentCommand::LogToolCall {
                tool_name,
                arguments,
                result,
                ..
            } => {
                input.content = Some(format!("Arguments: {arguments}\nResult: {result}"));
                input.tool_name = Some(tool_name);
            }
            AgentCommand::Terminate { reason, .. } => input.termination_reason = reason,
            AgentCommand::StartTrace { .. } => {}
        }

        let node = journal::lock(&self.journal).create_node(input)?;
        tracing::debug!(node_id = %node.id, kind = %node.kind, trace_id = %node.trace_id, "node recorded");
        // No subscribers is fine.
        let _ = self.bus.send(node.clone());
        Ok(Applied::Node(node))
    }

    fn trace_or_default(&mut self) -> TraceId {
        if let Some(id) = &self.current {
            if journal::lock(&self.journal).has_trace(id) {
                return id.clone();
            }
        }
        let info = journal::lock(&self.journal).create_trace(DEFAULT_TRACE_NAME, Some(DEFAULT_TRACE_DESCRIPTION));
        tracing::info!(trace_id = %info.id, "no active trace, started a default one");
        self.current = Some(info.id.clone());
        info.id
    }
}

pub fn parse_line(line: &str) -> Result<Option<AgentCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Read agent steps from stdin until EOF.
pub async fn run_stdin(mut session: Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await? {
        lineno += 1;
        let cmd = match parse_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(line = lineno, error = %e, "skipping invalid agent step");
                continue;
            }
        };
        if let Err(e) = session.apply(cmd) {
            tracing::warn!(line = lineno, error = %e, "agent step rejected");
        }
    }
    tracing::info!(trace_id = ?session.current_trace(), "agent step input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Journal;

    fn session() -> (Session, SharedJournal, broadcast::Receiver<ActionNode>) {
        let journal = Journal::shared();
        let (tx, rx) = broadcast::channel(16);
        (Session::new(journal.clone(), tx), journal, rx)
    }

    fn node(applied: Applied) -> ActionNode {
        match applied {
            Applied::Node(n) => n,
            other => panic!("expected a node, got {other:?}"),
        }
    }

    #[test]
    fn steps_chain_onto_the_previous_node() {
        let (mut s, _journal, mut rx) = session();
        let cmd = parse_line(r#"{"op":"log_step","step_name":"Read prompt","description":"todo app"}"#)
            .unwrap()
            .unwrap();
        let first = node(s.apply(cmd).unwrap());
        assert_eq!(first.log_level.as_deref(), Some("INFO"));
        assert_eq!(first.parent_id, None);

        let cmd = parse_line(
            r#"{"op":"mark_decision","decision_point":"Stack","options":["a","b"],"chosen_option":"a","reasoning":"simpler"}"#,
        )
        .unwrap()
        .unwrap();
        let decision = node(s.apply(cmd).unwrap());
        assert_eq!(decision.parent_id, Some(first.id.clone()));
        assert_eq!(decision.content.as_deref(), Some("Options: a, b\nReasoning: simpler"));
        assert_eq!(decision.decision_outcome.as_deref(), Some("a"));

        assert_eq!(rx.try_recv().unwrap().id, first.id);
        assert_eq!(rx.try_recv().unwrap().id, decision.id);
    }

    #[test]
    fn explicit_parent_branches_and_default_trace_is_created() {
        let (mut s, journal, _rx) = session();
        let root = node(
            s.apply(AgentCommand::LogStep {
                step_name: "root".into(),
                description: None,
                parent_id: None,
            })
            .unwrap(),
        );
        let trace = s.current_trace().cloned().unwrap();
        assert_eq!(journal::lock(&journal).traces()[0].name, DEFAULT_TRACE_NAME);

        s.apply(AgentCommand::Terminate {
            label: "dead end".into(),
            reason: Some("incompatible".into()),
            parent_id: None,
        })
        .unwrap();
        let tool = node(
            s.apply(AgentCommand::LogToolCall {
                tool_name: "write_file".into(),
                arguments: serde_json::json!({"path": "a.rs"}),
                result: "ok".into(),
                parent_id: Some(root.id.clone()),
            })
            .unwrap(),
        );
        assert_eq!(tool.label, "Tool Call: write_file");
        assert_eq!(tool.content.as_deref(), Some("Arguments: {\"path\":\"a.rs\"}\nResult: ok"));
        assert_eq!(tool.parent_id, Some(root.id));

        let tree = journal::lock(&journal).tree(&trace, journal::TREE_NESTING).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 2);
    }

    #[test]
    fn start_trace_resets_the_chain() {
        let (mut s, _journal, _rx) = session();
        s.apply(AgentCommand::LogStep {
            step_name: "old".into(),
            description: None,
            parent_id: None,
        })
        .unwrap();
        let Applied::Trace(info) = s
            .apply(AgentCommand::StartTrace {
                name: "fresh".into(),
                description: None,
            })
            .unwrap()
        else {
            panic!("expected a trace");
        };
        let first = node(
            s.apply(AgentCommand::LogStep {
                step_name: "new".into(),
                description: None,
                parent_id: None,
            })
            .unwrap(),
        );
        assert_eq!(first.trace_id, info.id);
        assert_eq!(first.parent_id, None);
    }

    #[test]
    fn unknown_parent_is_rejected_and_bad_lines_error() {
        let (mut s, _journal, _rx) = session();
        let err = s
            .apply(AgentCommand::LogStep {
                step_name: "x".into(),
                description: None,
                parent_id: Some(NodeId("77".into())),
            })
            .unwrap_err();
        assert_eq!(err, JournalError::UnknownParent(NodeId("77".into())));

        assert!(parse_line("{\"op\":\"fly\"}").is_err());
        assert!(parse_line("not json").is_err());
        assert!(parse_line("   ").unwrap().is_none());
    }
}
