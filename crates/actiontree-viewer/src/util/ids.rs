use actiontree_core::{ActionNode, NodeId, NodeKind};

// Flow ids are namespaced so a renderer can mix nodes and edges in one id space.
pub fn flow_node_id(id: &NodeId) -> String {
    format!("node-{}", id.0)
}

/// `-` only ever separates the two ends; `%` and `-` inside ids are escaped.
pub fn flow_edge_id(parent: &NodeId, child: &NodeId) -> String {
    format!("edge-{}-{}", escape_id(&parent.0), escape_id(&child.0))
}

fn escape_id(id: &str) -> String {
    if !id.contains(['%', '-']) {
        return id.to_string();
    }
    id.replace('%', "%25").replace('-', "%2D")
}

pub fn node_label_short(n: &ActionNode) -> String {
    format!("[{}] {}", n.kind.as_str(), n.label)
}

// display only
pub fn node_label_long(n: &ActionNode) -> Vec<String> {
    let mut out = Vec::new();
    let detail = match n.kind {
        NodeKind::Logging => n.log_level.as_ref().map(|l| format!("level: {l}")),
        NodeKind::Decision => n.decision_outcome.as_ref().map(|d| format!("outcome: {d}")),
        NodeKind::ToolCall => n.tool_name.as_ref().map(|t| format!("tool: {t}")),
        NodeKind::Terminal => n.termination_reason.as_ref().map(|r| format!("reason: {r}")),
    };
    out.extend(detail);
    if let Some(content) = &n.content {
        out.extend(content.lines().map(str::to_string));
    }
    out
}
