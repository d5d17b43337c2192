use actiontree_core::{ActionNode, NodeId, NodeKind, NodeRecord, TraceId, TraceInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nesting depth at which `tree` starts a new top-level entry. Keeps the
/// encoded payload shallow; every entry still carries its `parent_id`.
pub const TREE_NESTING: usize = 32;

pub type SharedJournal = Arc<Mutex<Journal>>;

pub fn lock(journal: &SharedJournal) -> MutexGuard<'_, Journal> {
    journal.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JournalError {
    #[error("unknown trace {0}")]
    UnknownTrace(TraceId),
    #[error("unknown parent node {0}")]
    UnknownParent(NodeId),
    #[error("parent node {parent} belongs to trace {parent_trace}, not {trace}")]
    ParentInOtherTrace {
        parent: NodeId,
        parent_trace: TraceId,
        trace: TraceId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub trace_id: TraceId,
    pub kind: NodeKind,
    pub label: String,
    pub content: Option<String>,
    pub parent_id: Option<NodeId>,
    pub tool_name: Option<String>,
    pub decision_outcome: Option<String>,
    pub log_level: Option<String>,
    pub termination_reason: Option<String>,
}

impl NewNode {
    pub fn new(trace_id: TraceId, kind: NodeKind, label: impl Into<String>) -> Self {
        Self {
            trace_id,
            kind,
            label: label.into(),
            content: None,
            parent_id: None,
            tool_name: None,
            decision_outcome: None,
            log_level: None,
            termination_reason: None,
        }
    }
}

/// In-memory, append-only record of traces and their nodes.
#[derive(Debug, Default)]
pub struct Journal {
    traces: Vec<TraceInfo>,
    nodes: HashMap<NodeId, ActionNode>,
    children: HashMap<NodeId, Vec<NodeId>>,
    roots: HashMap<TraceId, Vec<NodeId>>,
    cursors: HashMap<TraceId, NodeId>,
    next_trace: u64,
    next_node: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Journal {
    pub fn shared() -> SharedJournal {
        Arc::new(Mutex::new(Journal::default()))
    }

    pub fn create_trace(&mut self, name: &str, description: Option<&str>) -> TraceInfo {
        self.next_trace += 1;
        let info = TraceInfo {
            id: TraceId(self.next_trace.to_string()),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at_ms: now_ms(),
        };
        self.traces.push(info.clone());
        self.roots.entry(info.id.clone()).or_default();
        info
    }

    pub fn traces(&self) -> Vec<TraceInfo> {
        self.traces.clone()
    }

    pub fn has_trace(&self, id: &TraceId) -> bool {
        self.roots.contains_key(id)
    }

    /// Last node appended to `trace`; agent steps chain onto it by default.
    pub fn cursor(&self, trace: &TraceId) -> Option<&NodeId> {
        self.cursors.get(trace)
    }

    pub fn create_node(&mut self, input: NewNode) -> Result<ActionNode, JournalError> {
        if !self.has_trace(&input.trace_id) {
            return Err(JournalError::UnknownTrace(input.trace_id));
        }
        if let Some(parent) = &input.parent_id {
            let Some(p) = self.nodes.get(parent) else {
                return Err(JournalError::UnknownParent(parent.clone()));
            };
            if p.trace_id != input.trace_id {
                return Err(JournalError::ParentInOtherTrace {
                    parent: parent.clone(),
                    parent_trace: p.trace_id.clone(),
                    trace: input.trace_id,
                });
            }
        }

        self.next_node += 1;
        let node = ActionNode {
            id: NodeId(self.next_node.to_string()),
            kind: input.kind,
            label: input.label,
            content: input.content,
            timestamp_ms: now_ms(),
            parent_id: input.parent_id,
            trace_id: input.trace_id,
            tool_name: input.tool_name,
            decision_outcome: input.decision_outcome,
            log_level: input.log_level,
            termination_reason: input.termination_reason,
        };

        match &node.parent_id {
            Some(parent) => self.children.entry(parent.clone()).or_default().push(node.id.clone()),
            None => self.roots.entry(node.trace_id.clone()).or_default().push(node.id.clone()),
        }
        self.cursors.insert(node.trace_id.clone(), node.id.clone());
        self.nodes.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    pub fn node_count(&self, trace: &TraceId) -> usize {
        self.nodes.values().filter(|n| &n.trace_id == trace).count()
    }

    /// Nested tree for `trace`. Subtrees deeper than `nesting` levels are
    /// emitted as extra top-level entries instead of being cut off.
    pub fn tree(&self, trace: &TraceId, nesting: usize) -> Result<Vec<NodeRecord>, JournalError> {
        let Some(roots) = self.roots.get(trace) else {
            return Err(JournalError::UnknownTrace(trace.clone()));
        };
        let nesting = nesting.max(1);

        // Pre-order walk recording each node's nesting level.
        let mut order: Vec<(&NodeId, usize)> = Vec::new();
        let mut stack: Vec<(&NodeId, usize)> = roots.iter().rev().map(|id| (id, 0)).collect();
        while let Some((id, level)) = stack.pop() {
            order.push((id, level));
            let child_level = if level + 1 >= nesting { 0 } else { level + 1 };
            if let Some(kids) = self.children.get(id) {
                stack.extend(kids.iter().rev().map(|k| (k, child_level)));
            }
        }

        // Build bottom-up: reverse pre-order sees children before parents.
        let mut built: HashMap<&NodeId, NodeRecord> = HashMap::new();
        let mut top: Vec<NodeRecord> = Vec::new();
        let level_of: HashMap<&NodeId, usize> = order.iter().copied().collect();
        for &(id, level) in order.iter().rev() {
            let Some(node) = self.nodes.get(id) else { continue };
            let mut rec = NodeRecord::from(node);
            if let Some(kids) = self.children.get(id) {
                for k in kids {
                    if level_of.get(k).copied() != Some(0) {
                        if let Some(child) = built.remove(k) {
                            rec.children.push(child);
                        }
                    }
                }
            }
            if level == 0 {
                top.push(rec);
            } else {
                built.insert(id, rec);
            }
        }
        top.reverse();
        Ok(top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(records: &[NodeRecord]) -> usize {
        records.iter().map(|r| 1 + count(&r.children)).sum()
    }

    fn depth(records: &[NodeRecord]) -> usize {
        records.iter().map(|r| 1 + depth(&r.children)).max().unwrap_or(0)
    }

    #[test]
    fn nodes_chain_and_branch() {
        let mut j = Journal::default();
        let t = j.create_trace("Todo App Creation", None).id;
        let root = j.create_node(NewNode::new(t.clone(), NodeKind::Logging, "Initial Prompt")).unwrap();
        let mut d = NewNode::new(t.clone(), NodeKind::Decision, "Plan");
        d.parent_id = Some(root.id.clone());
        let decision = j.create_node(d).unwrap();
        let mut alt = NewNode::new(t.clone(), NodeKind::Decision, "Revised plan");
        alt.parent_id = Some(root.id.clone());
        j.create_node(alt).unwrap();

        assert_eq!(j.cursor(&t), Some(&NodeId("3".into())));
        let tree = j.tree(&t, TREE_NESTING).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].id, Some(decision.id));
    }

    #[test]
    fn rejects_bad_parents_and_traces() {
        let mut j = Journal::default();
        let t1 = j.create_trace("one", None).id;
        let t2 = j.create_trace("two", Some("second")).id;
        let n = j.create_node(NewNode::new(t1.clone(), NodeKind::Logging, "a")).unwrap();

        let mut cross = NewNode::new(t2.clone(), NodeKind::Logging, "b");
        cross.parent_id = Some(n.id.clone());
        assert!(matches!(j.create_node(cross), Err(JournalError::ParentInOtherTrace { .. })));

        let mut dangling = NewNode::new(t1, NodeKind::Logging, "c");
        dangling.parent_id = Some(NodeId("99".into()));
        assert_eq!(
            j.create_node(dangling),
            Err(JournalError::UnknownParent(NodeId("99".into())))
        );

        let missing = TraceId("404".into());
        assert_eq!(
            j.create_node(NewNode::new(missing.clone(), NodeKind::Logging, "d")),
            Err(JournalError::UnknownTrace(missing))
        );
        assert_eq!(j.node_count(&t2), 0);
    }

    #[test]
    fn deep_chains_are_split_not_truncated() {
        let mut j = Journal::default();
        let t = j.create_trace("deep", None).id;
        let mut parent = None;
        for i in 0..100 {
            let mut n = NewNode::new(t.clone(), NodeKind::Logging, format!("step {i}"));
            n.parent_id = parent.take();
            parent = Some(j.create_node(n).unwrap().id);
        }

        let tree = j.tree(&t, 32).unwrap();

        assert_eq!(count(&tree), 100);
        assert_eq!(tree.len(), 4);
        assert!(depth(&tree) <= 32);
        // Each continuation entry still names its parent.
        assert_eq!(tree[1].parent_id, Some(NodeId("32".into())));
    }
}
