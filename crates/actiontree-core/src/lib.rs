use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Ordered numerically when both ids are decimal integers ("9" < "10"),
/// otherwise by string; integer ids sort before the rest.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct NodeId(pub String);

fn decimal_digits(s: &str) -> Option<&str> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = s.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed })
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (decimal_digits(&self.0), decimal_digits(&other.0)) {
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TraceId(pub String);

// Backends hand out either numeric or string ids; both land as strings.
struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a string or integer id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(IdVisitor).map(NodeId)
    }
}

impl<'de> Deserialize<'de> for TraceId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        d.deserialize_any(IdVisitor).map(TraceId)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Logging,
    Decision,
    ToolCall,
    Terminal,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Logging,
        NodeKind::Decision,
        NodeKind::ToolCall,
        NodeKind::Terminal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Decision => "decision",
            Self::ToolCall => "tool_call",
            Self::Terminal => "terminal",
        }
    }

    /// Accepts the wire names plus the upper-case enum names older backends emit.
    pub fn parse(input: &str) -> Option<Self> {
        let norm = input.trim().to_ascii_lowercase().replace('-', "_");
        match norm.as_str() {
            "logging" => Some(Self::Logging),
            "decision" => Some(Self::Decision),
            "tool_call" | "toolcall" => Some(Self::ToolCall),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded agent action. Immutable once it has been accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub trace_id: TraceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is missing `{0}`")]
    MissingField(&'static str),
    #[error("record has unknown node type `{0}`")]
    UnknownKind(String),
    #[error("record field `{0}` has the wrong type")]
    InvalidField(&'static str),
}

/// Transport shape of a node: nothing is trusted, and tree payloads nest
/// children to whatever depth the backend produced.
///
/// Decoding never fails on content. A field of the wrong type is dropped and
/// remembered in `invalid`, so the record is rejected on conversion while its
/// siblings and children still decode.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NodeRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeRecord>,
    /// First field that could not be read.
    #[serde(skip)]
    pub invalid: Option<&'static str>,
}

fn id_text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

fn text(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn take<T>(
    map: &mut Map<String, Value>,
    key: &'static str,
    read: fn(Value) -> Option<T>,
    invalid: &mut Option<&'static str>,
) -> Option<T> {
    match map.remove(key) {
        None | Some(Value::Null) => None,
        Some(v) => {
            let out = read(v);
            if out.is_none() {
                invalid.get_or_insert(key);
            }
            out
        }
    }
}

impl NodeRecord {
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut map) = value else {
            return NodeRecord {
                invalid: Some("record"),
                ..Default::default()
            };
        };
        let mut invalid = None;
        let children = match map.remove("children") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.into_iter().map(NodeRecord::from_value).collect(),
            Some(_) => {
                invalid = Some("children");
                Vec::new()
            }
        };
        let m = &mut map;
        let inv = &mut invalid;
        NodeRecord {
            id: take(m, "id", id_text, inv).map(NodeId),
            kind: take(m, "type", text, inv),
            label: take(m, "label", text, inv),
            content: take(m, "content", text, inv),
            timestamp_ms: take(m, "timestamp_ms", |v| v.as_u64(), inv),
            parent_id: take(m, "parent_id", id_text, inv).map(NodeId),
            trace_id: take(m, "trace_id", id_text, inv).map(TraceId),
            tool_name: take(m, "tool_name", text, inv),
            decision_outcome: take(m, "decision_outcome", text, inv),
            log_level: take(m, "log_level", text, inv),
            termination_reason: take(m, "termination_reason", text, inv),
            children,
            invalid,
        }
    }
}

impl<'de> Deserialize<'de> for NodeRecord {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Value::deserialize(d).map(NodeRecord::from_value)
    }
}

impl NodeRecord {
    /// Detach nested children and validate the remaining flat record.
    pub fn split(mut self) -> (Result<ActionNode, RecordError>, Vec<NodeRecord>) {
        let children = std::mem::take(&mut self.children);
        (ActionNode::try_from(self), children)
    }
}

impl TryFrom<NodeRecord> for ActionNode {
    type Error = RecordError;

    fn try_from(r: NodeRecord) -> Result<Self, Self::Error> {
        if let Some(field) = r.invalid {
            return Err(RecordError::InvalidField(field));
        }
        let id = r.id.ok_or(RecordError::MissingField("id"))?;
        let trace_id = r.trace_id.ok_or(RecordError::MissingField("trace_id"))?;
        let raw_kind = r.kind.ok_or(RecordError::MissingField("type"))?;
        let kind = NodeKind::parse(&raw_kind).ok_or(RecordError::UnknownKind(raw_kind))?;
        Ok(ActionNode {
            label: r.label.unwrap_or_else(|| id.0.clone()),
            id,
            kind,
            content: r.content,
            timestamp_ms: r.timestamp_ms.unwrap_or(0),
            parent_id: r.parent_id,
            trace_id,
            tool_name: r.tool_name,
            decision_outcome: r.decision_outcome,
            log_level: r.log_level,
            termination_reason: r.termination_reason,
        })
    }
}

impl From<&ActionNode> for NodeRecord {
    fn from(n: &ActionNode) -> Self {
        NodeRecord {
            id: Some(n.id.clone()),
            kind: Some(n.kind.as_str().to_string()),
            label: Some(n.label.clone()),
            content: n.content.clone(),
            timestamp_ms: Some(n.timestamp_ms),
            parent_id: n.parent_id.clone(),
            trace_id: Some(n.trace_id.clone()),
            tool_name: n.tool_name.clone(),
            decision_outcome: n.decision_outcome.clone(),
            log_level: n.log_level.clone(),
            termination_reason: n.termination_reason.clone(),
            children: Vec::new(),
            invalid: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceInfo {
    pub id: TraceId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Msg {
    Hello { version: String },
    ListTraces,
    Traces { traces: Vec<TraceInfo> },
    RequestTree { trace_id: TraceId },
    Tree { trace_id: TraceId, roots: Vec<NodeRecord> },
    Subscribe { trace_id: Option<TraceId> },
    NodeCreated { node: NodeRecord },
    Error { message: String },
    Ping,
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_are_accepted() {
        let rec: NodeRecord = serde_json::from_str(
            r#"{"id": 7, "type": "TOOL_CALL", "trace_id": 1, "parent_id": 3, "label": "call"}"#,
        )
        .expect("decode record");
        let node = ActionNode::try_from(rec).expect("valid record");
        assert_eq!(node.id, NodeId("7".into()));
        assert_eq!(node.parent_id, Some(NodeId("3".into())));
        assert_eq!(node.trace_id, TraceId("1".into()));
        assert_eq!(node.kind, NodeKind::ToolCall);
    }

    #[test]
    fn missing_fields_are_reported() {
        let rec = NodeRecord {
            id: Some(NodeId("1".into())),
            kind: Some("logging".into()),
            ..Default::default()
        };
        assert_eq!(
            ActionNode::try_from(rec),
            Err(RecordError::MissingField("trace_id"))
        );

        let rec = NodeRecord {
            id: Some(NodeId("1".into())),
            trace_id: Some(TraceId("t".into())),
            kind: Some("thinking".into()),
            ..Default::default()
        };
        assert_eq!(
            ActionNode::try_from(rec),
            Err(RecordError::UnknownKind("thinking".into()))
        );
    }

    #[test]
    fn split_keeps_children_of_invalid_record() {
        let rec = NodeRecord {
            children: vec![NodeRecord {
                id: Some(NodeId("2".into())),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (head, children) = rec.split();
        assert!(head.is_err());
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn wrong_typed_node_only_invalidates_itself() {
        let json = r#"{"type": "Tree", "data": {"trace_id": 1, "roots": [
            {"id": "a", "type": "logging", "trace_id": 1, "children": [
                {"id": "b", "type": "decision", "trace_id": 1, "parent_id": "a"},
                {"id": "c", "type": "logging", "trace_id": 1, "parent_id": "a",
                 "timestamp_ms": "2024-01-01T00:00:00Z",
                 "children": [{"id": "d", "type": "terminal", "trace_id": 1, "parent_id": "c"}]},
                {"id": 2.5, "type": "logging", "trace_id": 1},
                {"id": "e", "type": "logging", "trace_id": 1, "label": 42},
                17
            ]}
        ]}}"#;
        let Msg::Tree { roots, .. } = serde_json::from_str::<Msg>(json).expect("envelope decodes") else {
            panic!("expected a tree");
        };
        let kids = &roots[0].children;
        assert_eq!(kids.len(), 5);
        assert!(ActionNode::try_from(roots[0].clone()).is_ok());
        assert!(ActionNode::try_from(kids[0].clone()).is_ok());
        assert_eq!(
            ActionNode::try_from(kids[1].clone()),
            Err(RecordError::InvalidField("timestamp_ms"))
        );
        assert_eq!(kids[1].children[0].id, Some(NodeId("d".into())));
        assert_eq!(ActionNode::try_from(kids[2].clone()), Err(RecordError::InvalidField("id")));
        assert_eq!(ActionNode::try_from(kids[3].clone()), Err(RecordError::InvalidField("label")));
        assert_eq!(ActionNode::try_from(kids[4].clone()), Err(RecordError::InvalidField("record")));
    }

    #[test]
    fn decimal_ids_sort_numerically() {
        let mut ids: Vec<NodeId> = ["10", "9", "b", "a-1", "010", "2"]
            .iter()
            .map(|s| NodeId(s.to_string()))
            .collect();
        ids.sort();
        let got: Vec<&str> = ids.iter().map(|i| i.0.as_str()).collect();
        assert_eq!(got, vec!["2", "9", "010", "10", "a-1", "b"]);
    }

    #[test]
    fn msg_uses_tagged_layout() {
        let msg = Msg::Subscribe {
            trace_id: Some(TraceId("4".into())),
        };
        let json = serde_json::to_value(&msg).expect("encode");
        assert_eq!(json["type"], "Subscribe");
        assert_eq!(json["data"]["trace_id"], "4");
    }
}
