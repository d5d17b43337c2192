//! Layered (Sugiyama-style) placement for action trees.
//!
//! 1. ranks by longest path from the nodes without an incoming edge
//! 2. order inside each rank: depth-first seed, then barycenter sweeps
//! 3. coordinates from rank and order, each rank centred on the widest one
//!
//! Nodes the rank pass never releases sit on a cycle (or below one). They
//! are reported in [`Layout::unlaid`] and parked at the origin.

use actiontree_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    TopToBottom,
    LeftToRight,
}

impl Direction {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "tb" | "td" | "top_to_bottom" | "top-to-bottom" => Some(Self::TopToBottom),
            "lr" | "left_to_right" | "left-to-right" => Some(Self::LeftToRight),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopToBottom => "top_to_bottom",
            Self::LeftToRight => "left_to_right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub direction: Direction,
    pub node_width: f32,
    pub node_height: f32,
    /// Gap between neighbouring boxes inside a rank.
    pub node_gap: f32,
    /// Gap between consecutive ranks.
    pub rank_gap: f32,
    pub max_crossing_passes: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: Direction::TopToBottom,
            node_width: 172.0,
            node_height: 36.0,
            node_gap: 50.0,
            rank_gap: 50.0,
            max_crossing_passes: 8,
        }
    }
}

impl LayoutConfig {
    fn sanitized(&self) -> Self {
        Self {
            direction: self.direction,
            node_width: self.node_width.max(1.0),
            node_height: self.node_height.max(1.0),
            node_gap: self.node_gap.max(0.0),
            rank_gap: self.rank_gap.max(0.0),
            max_crossing_passes: self.max_crossing_passes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    /// Top-left corner of each node box.
    pub positions: HashMap<NodeId, Point>,
    pub ranks: HashMap<NodeId, usize>,
    pub unlaid: Vec<NodeId>,
    pub crossings: usize,
}

impl Layout {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

struct LayoutGraph {
    ids: Vec<NodeId>,
    adj: Vec<Vec<usize>>,
    rev: Vec<Vec<usize>>,
}

impl LayoutGraph {
    fn new(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> Self {
        let mut ids: Vec<NodeId> = nodes.to_vec();
        ids.sort();
        ids.dedup();
        let index: HashMap<&NodeId, usize> = ids.iter().enumerate().map(|(i, id)| (id, i)).collect();

        let mut adj = vec![Vec::new(); ids.len()];
        let mut rev = vec![Vec::new(); ids.len()];
        for (from, to) in edges {
            let (Some(&u), Some(&v)) = (index.get(from), index.get(to)) else {
                continue;
            };
            if !adj[u].contains(&v) {
                adj[u].push(v);
                rev[v].push(u);
            }
        }
        for list in adj.iter_mut().chain(rev.iter_mut()) {
            list.sort_unstable();
        }
        Self { ids, adj, rev }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Lay out `nodes` with parent→child `edges`. Edges naming unknown nodes are ignored.
pub fn layout(nodes: &[NodeId], edges: &[(NodeId, NodeId)], cfg: &LayoutConfig) -> Layout {
    if nodes.is_empty() {
        return Layout::default();
    }
    let cfg = cfg.sanitized();
    let graph = LayoutGraph::new(nodes, edges);

    let ranks = assign_ranks(&graph);
    let mut rank_order = seed_order(&graph, &ranks);
    let crossings = minimize_crossings(&mut rank_order, &graph, cfg.max_crossing_passes);
    let coords = assign_coordinates(&rank_order, &graph, &cfg);

    let mut out = Layout {
        crossings,
        ..Layout::default()
    };
    for (i, id) in graph.ids.iter().enumerate() {
        match ranks[i] {
            Some(r) => {
                out.ranks.insert(id.clone(), r);
                out.positions.insert(id.clone(), coords[i]);
            }
            None => {
                out.unlaid.push(id.clone());
                out.positions.insert(id.clone(), Point::default());
            }
        }
    }
    if !out.unlaid.is_empty() {
        tracing::warn!(count = out.unlaid.len(), "cycle in node graph, nodes left unplaced");
    }
    out
}

// ---- ranks ----

/// Longest-path ranks via Kahn's algorithm. Nodes still holding an
/// incoming edge when the queue drains are on or below a cycle: `None`.
fn assign_ranks(graph: &LayoutGraph) -> Vec<Option<usize>> {
    let n = graph.len();
    let mut in_degree: Vec<usize> = graph.rev.iter().map(Vec::len).collect();
    let mut ranks: Vec<Option<usize>> = vec![None; n];
    let mut queue: Vec<usize> = (0..n).filter(|&v| in_degree[v] == 0).collect();
    for &v in &queue {
        ranks[v] = Some(0);
    }

    let mut head = 0;
    while head < queue.len() {
        let u = queue[head];
        head += 1;
        let ru = ranks[u].unwrap_or(0);
        for &v in &graph.adj[u] {
            ranks[v] = Some(ranks[v].map_or(ru + 1, |rv| rv.max(ru + 1)));
            in_degree[v] -= 1;
            if in_degree[v] == 0 {
                queue.push(v);
            }
        }
    }

    for v in 0..n {
        if in_degree[v] > 0 {
            ranks[v] = None;
        }
    }
    ranks
}

// ---- ordering ----

/// Depth-first order from the rank-0 nodes; for a forest this alone is
/// crossing-free.
fn seed_order(graph: &LayoutGraph, ranks: &[Option<usize>]) -> Vec<Vec<usize>> {
    let max_rank = ranks.iter().flatten().copied().max().unwrap_or(0);
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); max_rank + 1];
    let mut placed = vec![false; graph.len()];

    let mut stack: Vec<usize> = (0..graph.len())
        .filter(|&v| ranks[v] == Some(0))
        .rev()
        .collect();
    while let Some(u) = stack.pop() {
        if placed[u] {
            continue;
        }
        let Some(r) = ranks[u] else { continue };
        placed[u] = true;
        buckets[r].push(u);
        for &v in graph.adj[u].iter().rev() {
            // Only descend along edges that step exactly one rank; longer
            // edges are picked up once all of v's parents are placed.
            if !placed[v] && ranks[v] == Some(r + 1) {
                stack.push(v);
            }
        }
    }
    for v in 0..graph.len() {
        if let (false, Some(r)) = (placed[v], ranks[v]) {
            buckets[r].push(v);
        }
    }
    buckets
}

fn positions_of(rank: &[usize], n: usize) -> Vec<usize> {
    let mut pos = vec![usize::MAX; n];
    for (i, &v) in rank.iter().enumerate() {
        pos[v] = i;
    }
    pos
}

fn barycenter(neighbors: &[usize], pos: &[usize]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &nb in neighbors {
        if pos[nb] != usize::MAX {
            sum += pos[nb] as f64;
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}

/// Reorder `rank_order[r]` by the mean position of its neighbours in
/// `rank_order[fixed]`. Nodes without such neighbours keep their slot.
fn sweep(rank_order: &mut [Vec<usize>], graph: &LayoutGraph, r: usize, fixed: usize, downward: bool) {
    let pos = positions_of(&rank_order[fixed], graph.len());
    let mut scored: Vec<(usize, f64, usize)> = rank_order[r]
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let nbs = if downward { &graph.rev[v] } else { &graph.adj[v] };
            (v, barycenter(nbs, &pos).unwrap_or(i as f64), i)
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)));
    rank_order[r] = scored.into_iter().map(|(v, _, _)| v).collect();
}

fn count_crossings(upper: &[usize], lower: &[usize], graph: &LayoutGraph) -> usize {
    let pos = positions_of(lower, graph.len());
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for (i, &u) in upper.iter().enumerate() {
        for &v in &graph.adj[u] {
            if pos[v] != usize::MAX {
                pairs.push((i, pos[v]));
            }
        }
    }
    pairs.sort_unstable();
    let mut seq: Vec<usize> = pairs.into_iter().map(|(_, b)| b).collect();
    count_inversions(&mut seq)
}

/// Merge-sort inversion count; pairs with equal lower positions do not cross.
fn count_inversions(seq: &mut [usize]) -> usize {
    let n = seq.len();
    if n < 2 {
        return 0;
    }
    let mid = n / 2;
    let mut count = count_inversions(&mut seq[..mid]) + count_inversions(&mut seq[mid..]);
    let mut merged = Vec::with_capacity(n);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < n {
        if seq[i] <= seq[j] {
            merged.push(seq[i]);
            i += 1;
        } else {
            merged.push(seq[j]);
            count += mid - i;
            j += 1;
        }
    }
    merged.extend_from_slice(&seq[i..mid]);
    merged.extend_from_slice(&seq[j..n]);
    seq.copy_from_slice(&merged);
    count
}

fn total_crossings(rank_order: &[Vec<usize>], graph: &LayoutGraph) -> usize {
    rank_order
        .windows(2)
        .map(|w| count_crossings(&w[0], &w[1], graph))
        .sum()
}

/// Alternate downward and upward barycenter sweeps, keeping the best
/// ordering seen. Stops at zero crossings or the first pass without gain.
fn minimize_crossings(rank_order: &mut Vec<Vec<usize>>, graph: &LayoutGraph, max_passes: usize) -> usize {
    let mut best = total_crossings(rank_order, graph);
    if rank_order.len() <= 1 || best == 0 {
        return best;
    }
    let mut best_order = rank_order.clone();
    for _ in 0..max_passes {
        for r in 1..rank_order.len() {
            sweep(rank_order, graph, r, r - 1, true);
        }
        for r in (0..rank_order.len() - 1).rev() {
            sweep(rank_order, graph, r, r + 1, false);
        }
        let crossings = total_crossings(rank_order, graph);
        if crossings < best {
            best = crossings;
            best_order = rank_order.clone();
            if best == 0 {
                break;
            }
        } else {
            break;
        }
    }
    *rank_order = best_order;
    best
}

// ---- coordinates ----

fn assign_coordinates(rank_order: &[Vec<usize>], graph: &LayoutGraph, cfg: &LayoutConfig) -> Vec<Point> {
    let (rank_extent, order_extent) = match cfg.direction {
        Direction::TopToBottom => (cfg.node_height, cfg.node_width),
        Direction::LeftToRight => (cfg.node_width, cfg.node_height),
    };
    let rank_step = rank_extent + cfg.rank_gap;
    let order_step = order_extent + cfg.node_gap;

    let span = |count: usize| {
        if count == 0 {
            0.0
        } else {
            count as f32 * order_extent + (count - 1) as f32 * cfg.node_gap
        }
    };
    let widest = rank_order.iter().map(|r| span(r.len())).fold(0.0_f32, f32::max);

    let mut out = vec![Point::default(); graph.len()];
    for (r, nodes) in rank_order.iter().enumerate() {
        let shift = (widest - span(nodes.len())) / 2.0;
        for (i, &v) in nodes.iter().enumerate() {
            // Slot centre, then back off half a box to the top-left corner.
            let along = r as f32 * rank_step + rank_extent / 2.0;
            let across = shift + i as f32 * order_step + order_extent / 2.0;
            out[v] = match cfg.direction {
                Direction::TopToBottom => Point {
                    x: across - cfg.node_width / 2.0,
                    y: along - cfg.node_height / 2.0,
                },
                Direction::LeftToRight => Point {
                    x: along - cfg.node_width / 2.0,
                    y: across - cfg.node_height / 2.0,
                },
            };
        }
    }
    out
}
