use actiontree_core::{ActionNode, NodeId, NodeKind, TraceId};
use serde::Serialize;
use std::collections::HashSet;

use crate::graph::filter::filter_nodes;
use crate::graph::layout::{layout, Direction, LayoutConfig, Point};
use crate::graph::model::NodeStore;
use crate::util::ids::{flow_edge_id, flow_node_id};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewOptions {
    pub direction: Direction,
    pub type_filter: Option<NodeKind>,
    pub search: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum FeedStatus {
    #[default]
    Connecting,
    Live,
    Unavailable(String),
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowNode {
    pub id: String,
    pub data: ActionNode,
    pub position: Point,
    pub laid_out: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Render-ready snapshot. Rebuilt from scratch on every recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewFrame {
    pub trace_id: TraceId,
    pub status: FeedStatus,
    pub direction: Direction,
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
    pub total_nodes: usize,
    pub unresolved: usize,
}

pub fn assemble(
    store: &NodeStore,
    options: &ViewOptions,
    layout_cfg: &LayoutConfig,
    status: &FeedStatus,
) -> ViewFrame {
    let kept = filter_nodes(store.nodes(), options.type_filter, &options.search);
    let kept_ids: HashSet<&NodeId> = kept.iter().map(|n| &n.id).collect();

    // Both endpoints must survive; no reattaching to a surviving grandparent.
    let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
    for n in &kept {
        for child in store.children(&n.id) {
            if kept_ids.contains(child) {
                edges.push((n.id.clone(), child.clone()));
            }
        }
    }

    let ids: Vec<NodeId> = kept.iter().map(|n| n.id.clone()).collect();
    let cfg = LayoutConfig {
        direction: options.direction,
        ..layout_cfg.clone()
    };
    let placed = layout(&ids, &edges, &cfg);

    let nodes = kept
        .iter()
        .map(|n| FlowNode {
            id: flow_node_id(&n.id),
            data: (*n).clone(),
            position: placed.positions.get(&n.id).copied().unwrap_or_default(),
            laid_out: placed.ranks.contains_key(&n.id),
        })
        .collect();
    let edges = edges
        .iter()
        .map(|(p, c)| FlowEdge {
            id: flow_edge_id(p, c),
            source: flow_node_id(p),
            target: flow_node_id(c),
        })
        .collect();

    ViewFrame {
        trace_id: store.trace_id().clone(),
        status: status.clone(),
        direction: options.direction,
        nodes,
        edges,
        total_nodes: store.len(),
        unresolved: store.unresolved().len(),
    }
}
