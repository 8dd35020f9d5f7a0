use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod template;

pub use error::{ErrorCategory, QueryError, UnavailableCause};
pub use template::{fingerprint, ParamDecl, QueryTemplate, ResultFormat, ResultStyle, Step, SubgraphStyle};

/// Property key under which every vertex records its node type.
pub const NODE_TYPE_PROPERTY: &str = "aai-node-type";

/// A class of graph vertex, e.g. `customer` or `l-interface`.
///
/// Node types are defined by the external schema and treated as opaque,
/// cheaply clonable strings.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeType(Arc<str>);

impl NodeType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeType({})", self.0)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        NodeType::new(s)
    }
}

impl From<String> for NodeType {
    fn from(s: String) -> Self {
        NodeType(Arc::from(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Out,
    In,
    Both,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
            Direction::Both => Direction::Both,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Out => "out",
            Direction::In => "in",
            Direction::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relationship {
    /// Ownership: the far vertex is structurally inside the near one.
    Containment,
    /// Cousin edge between otherwise independent vertices.
    Peer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Multiplicity {
    One,
    Many,
}

/// A permitted relationship between an ordered pair of node types.
///
/// `direction` is relative to travelling from `from` to `to`: `Out` means the
/// stored edge starts at the `from` vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRule {
    pub from: NodeType,
    pub to: NodeType,
    pub label: String,
    pub direction: Direction,
    pub relationship: Relationship,
    #[serde(default = "default_multiplicity")]
    pub multiplicity: Multiplicity,
    #[serde(default)]
    pub is_default: bool,
}

fn default_multiplicity() -> Multiplicity {
    Multiplicity::Many
}

impl EdgeRule {
    pub fn new(
        from: impl Into<NodeType>,
        to: impl Into<NodeType>,
        label: impl Into<String>,
        direction: Direction,
        relationship: Relationship,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: label.into(),
            direction,
            relationship,
            multiplicity: Multiplicity::Many,
            is_default: false,
        }
    }

    pub fn with_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    /// The same rule seen from the `to` side.
    pub fn reversed(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            label: self.label.clone(),
            direction: self.direction.reversed(),
            relationship: self.relationship,
            multiplicity: self.multiplicity,
            is_default: self.is_default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(pub u64);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Vertex {
    pub fn new(id: u64, node_type: impl Into<NodeType>) -> Self {
        Self {
            id: VertexId(id),
            node_type: node_type.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Property lookup that also answers the reserved node-type key.
    pub fn property(&self, key: &str) -> Option<serde_json::Value> {
        if key == NODE_TYPE_PROPERTY {
            return Some(serde_json::Value::String(self.node_type.as_str().to_string()));
        }
        self.properties.get(key).cloned()
    }

    pub fn has_property(&self, key: &str, value: &serde_json::Value) -> bool {
        self.property(key).as_ref() == Some(value)
    }
}

/// A concrete stored edge between two vertices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub out_v: VertexId,
    pub in_v: VertexId,
    pub label: String,
    pub relationship: Relationship,
}

impl EdgeRecord {
    pub fn other_end(&self, id: VertexId) -> VertexId {
        if self.out_v == id {
            self.in_v
        } else {
            self.out_v
        }
    }
}

/// Filter that selects the starting vertices of a traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default)]
    pub properties: Vec<(String, serde_json::Value)>,
}

impl StartPredicate {
    pub fn of_type(node_type: impl Into<NodeType>) -> Self {
        Self {
            node_type: Some(node_type.into()),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, vertex: &Vertex) -> bool {
        if let Some(node_type) = &self.node_type {
            if &vertex.node_type != node_type {
                return false;
            }
        }
        self.properties.iter().all(|(k, v)| vertex.has_property(k, v))
    }
}

/// Render a property value as a grouping key. Strings are used verbatim,
/// everything else as its JSON text.
pub fn value_key(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direction_reversal() {
        assert_eq!(Direction::Out.reversed(), Direction::In);
        assert_eq!(Direction::In.reversed(), Direction::Out);
        assert_eq!(Direction::Both.reversed(), Direction::Both);
    }

    #[test]
    fn test_edge_rule_reversed_keeps_label_and_kind() {
        let rule = EdgeRule::new("customer", "service-subscription", "subscribesTo", Direction::Out, Relationship::Containment)
            .with_default();
        let rev = rule.reversed();
        assert_eq!(rev.from.as_str(), "service-subscription");
        assert_eq!(rev.to.as_str(), "customer");
        assert_eq!(rev.direction, Direction::In);
        assert_eq!(rev.label, "subscribesTo");
        assert!(rev.is_default);
        assert_eq!(rev.reversed(), rule);
    }

    #[test]
    fn test_edge_rule_deserialize_defaults() {
        let raw = r#"{"from":"pserver","to":"p-interface","label":"hasInterface","direction":"OUT","relationship":"CONTAINMENT"}"#;
        let rule: EdgeRule = serde_json::from_str(raw).expect("Failed to deserialize rule");
        assert_eq!(rule.multiplicity, Multiplicity::Many);
        assert!(!rule.is_default);
        assert_eq!(rule.from, NodeType::from("pserver"));
    }

    #[test]
    fn test_node_type_serializes_as_plain_string() {
        let node_type = NodeType::from("l-interface");
        let encoded = serde_json::to_value(&node_type).expect("Failed to serialize node type");
        assert_eq!(encoded, json!("l-interface"));
        let decoded: NodeType = serde_json::from_value(encoded).expect("Failed to deserialize node type");
        assert_eq!(decoded, node_type);
    }

    #[test]
    fn test_start_predicate_matches_type_and_properties() {
        let v = Vertex::new(1, "customer").with_property("global-customer-id", "c-1");
        assert!(StartPredicate::of_type("customer").matches(&v));
        assert!(StartPredicate::of_type("customer").with_property("global-customer-id", "c-1").matches(&v));
        assert!(!StartPredicate::of_type("customer").with_property("global-customer-id", "c-2").matches(&v));
        assert!(!StartPredicate::of_type("pserver").matches(&v));
        assert!(StartPredicate::default().matches(&v));
    }

    #[test]
    fn test_node_type_property_is_virtual() {
        let v = Vertex::new(7, "vlan");
        assert!(v.has_property(NODE_TYPE_PROPERTY, &json!("vlan")));
        assert_eq!(v.property("vlan-id"), None);
    }

    #[test]
    fn test_value_key_rendering() {
        assert_eq!(value_key(&json!("vFW")), "vFW");
        assert_eq!(value_key(&json!(42)), "42");
        assert_eq!(value_key(&json!(true)), "true");
    }
}
