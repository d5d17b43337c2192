use actiontree_core::{ActionNode, NodeKind};

/// Narrow a node set by type and free-text search. Structural fields are
/// never touched; callers decide which edges survive.
pub fn filter_nodes<'a, I>(nodes: I, type_filter: Option<NodeKind>, search: &str) -> Vec<&'a ActionNode>
where
    I: IntoIterator<Item = &'a ActionNode>,
{
    let needle = search.trim().to_lowercase();
    nodes
        .into_iter()
        .filter(|n| passes_filter(n, type_filter, &needle))
        .collect()
}

/// `needle` must already be trimmed and lower-cased; empty disables text matching.
pub fn passes_filter(node: &ActionNode, type_filter: Option<NodeKind>, needle: &str) -> bool {
    if let Some(kind) = type_filter {
        if node.kind != kind {
            return false;
        }
    }
    if needle.is_empty() {
        return true;
    }
    let hit = |field: Option<&str>| field.is_some_and(|s| s.to_lowercase().contains(needle));
    hit(Some(&node.label))
        || hit(node.content.as_deref())
        || hit(node.tool_name.as_deref())
        || hit(node.decision_outcome.as_deref())
}
