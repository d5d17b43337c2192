use actiontree_core::{ActionNode, NodeId, NodeRecord, RecordError, TraceId};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

pub type ChildList = SmallVec<[NodeId; 4]>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub foreign: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Duplicate,
    Rejected(RecordError),
    Foreign(TraceId),
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        matches!(self, MergeOutcome::Inserted)
    }
}

/// Append-only node index for a single trace.
///
/// Records may arrive in any order and more than once. A child whose parent
/// has not arrived yet is kept and parked under the missing parent id; the
/// edge is attached as soon as that parent is merged.
#[derive(Debug)]
pub struct NodeStore {
    trace_id: TraceId,
    nodes: BTreeMap<NodeId, ActionNode>,
    children: HashMap<NodeId, ChildList>,
    pending: HashMap<NodeId, ChildList>,
    stats: IngestStats,
}

impl NodeStore {
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            nodes: BTreeMap::new(),
            children: HashMap::new(),
            pending: HashMap::new(),
            stats: IngestStats::default(),
        }
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Replace the contents with a (possibly nested) tree payload.
    pub fn initialize(&mut self, roots: Vec<NodeRecord>) -> IngestStats {
        self.nodes.clear();
        self.children.clear();
        self.pending.clear();
        self.stats = IngestStats::default();

        // Explicit work list: payload depth is whatever the backend produced.
        let mut work: Vec<NodeRecord> = roots;
        work.reverse();
        while let Some(record) = work.pop() {
            let (head, kids) = record.split();
            match head {
                Ok(node) => {
                    self.insert_checked(node);
                }
                Err(err) => self.reject(err),
            }
            work.extend(kids.into_iter().rev());
        }

        tracing::debug!(
            trace_id = %self.trace_id,
            accepted = self.stats.accepted,
            dropped = self.stats.dropped,
            duplicates = self.stats.duplicates,
            "store initialized"
        );
        self.stats
    }

    /// Idempotent insert of a single live record. Nested children on a live
    /// record are ignored; the feed delivers them as their own records.
    pub fn merge(&mut self, record: NodeRecord) -> MergeOutcome {
        match ActionNode::try_from(record) {
            Ok(node) => self.insert_checked(node),
            Err(err) => {
                self.reject(err.clone());
                MergeOutcome::Rejected(err)
            }
        }
    }

    fn reject(&mut self, err: RecordError) {
        self.stats.dropped += 1;
        tracing::warn!(trace_id = %self.trace_id, error = %err, "dropping malformed node record");
    }

    fn insert_checked(&mut self, node: ActionNode) -> MergeOutcome {
        if node.trace_id != self.trace_id {
            self.stats.foreign += 1;
            tracing::warn!(
                node_id = %node.id,
                node_trace = %node.trace_id,
                trace_id = %self.trace_id,
                "dropping node from another trace"
            );
            return MergeOutcome::Foreign(node.trace_id);
        }
        if self.nodes.contains_key(&node.id) {
            self.stats.duplicates += 1;
            tracing::trace!(node_id = %node.id, "duplicate delivery ignored");
            return MergeOutcome::Duplicate;
        }

        let id = node.id.clone();
        let parent = node.parent_id.clone();
        self.nodes.insert(id.clone(), node);
        self.stats.accepted += 1;

        // Children that showed up before this node.
        if let Some(waiting) = self.pending.remove(&id) {
            let list = self.children.entry(id.clone()).or_default();
            for child in waiting {
                insert_sorted(list, child);
            }
        }

        if let Some(parent) = parent {
            if self.nodes.contains_key(&parent) {
                insert_sorted(self.children.entry(parent).or_default(), id);
            } else {
                tracing::debug!(node_id = %id, parent_id = %parent, "parent not indexed yet");
                insert_sorted(self.pending.entry(parent).or_default(), id);
            }
        }
        MergeOutcome::Inserted
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&ActionNode> {
        self.nodes.get(id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &ActionNode> {
        self.nodes.values()
    }

    /// Known children of `id`, ordered by id. Empty when none have arrived.
    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map(|c| c.as_slice()).unwrap_or(&[])
    }

    /// Nodes without a parent in the store: true roots plus children whose
    /// parent is still missing.
    pub fn roots(&self) -> Vec<&NodeId> {
        self.nodes
            .values()
            .filter(|n| match &n.parent_id {
                None => true,
                Some(p) => !self.nodes.contains_key(p),
            })
            .map(|n| &n.id)
            .collect()
    }

    /// Nodes waiting for a parent that has not been merged yet.
    pub fn unresolved(&self) -> Vec<&NodeId> {
        let mut out: Vec<&NodeId> = self.pending.values().flatten().collect();
        out.sort();
        out
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }
}

fn insert_sorted(list: &mut ChildList, id: NodeId) {
    if let Err(at) = list.binary_search(&id) {
        list.insert(at, id);
    }
}
