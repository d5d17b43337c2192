use actiontree_core::{NodeRecord, TraceId, TraceInfo};

/// Something the feed reader observed, tagged with the trace it was reading
/// for so that messages from a reader that has since been replaced can be
/// told apart.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub trace_id: TraceId,
    pub kind: IncomingKind,
}

#[derive(Debug, Clone)]
pub enum IncomingKind {
    Connected,
    Disconnected,
    Tree(Vec<NodeRecord>),
    Node(NodeRecord),
    Traces(Vec<TraceInfo>),
    Error(String),
}

impl Incoming {
    pub fn connected(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            kind: IncomingKind::Connected,
        }
    }

    pub fn disconnected(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            kind: IncomingKind::Disconnected,
        }
    }

    pub fn tree(trace_id: TraceId, roots: Vec<NodeRecord>) -> Self {
        Self {
            trace_id,
            kind: IncomingKind::Tree(roots),
        }
    }

    pub fn node(trace_id: TraceId, node: NodeRecord) -> Self {
        Self {
            trace_id,
            kind: IncomingKind::Node(node),
        }
    }

    pub fn traces(trace_id: TraceId, traces: Vec<TraceInfo>) -> Self {
        Self {
            trace_id,
            kind: IncomingKind::Traces(traces),
        }
    }

    pub fn error(trace_id: TraceId, msg: String) -> Self {
        Self {
            trace_id,
            kind: IncomingKind::Error(msg),
        }
    }
}
