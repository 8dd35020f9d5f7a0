// Traversal operations and raw backend results.
//
// These are the backend-agnostic types exchanged between the compiler, the
// execution engine and every backend. They are serde types because the
// remote backend ships them over the wire as JSON.

use invgraph_common::{Direction, EdgeRecord, NodeType, Relationship, ResultFormat, StartPredicate, Vertex, VertexId};
use serde::{Deserialize, Serialize};

/// One compiled, rule-resolved traversal step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraversalOp {
    HasProperty { key: String, value: serde_json::Value },
    HasType { node_type: NodeType },
    Traverse {
        label: String,
        direction: Direction,
        relationship: Relationship,
    },
    Branch { branches: Vec<Vec<TraversalOp>> },
    GroupCount { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Vertices,
    Tree,
    Groups,
}

impl From<ResultFormat> for ExecutionMode {
    fn from(format: ResultFormat) -> Self {
        match format {
            ResultFormat::Vertices => ExecutionMode::Vertices,
            ResultFormat::Tree => ExecutionMode::Tree,
            ResultFormat::Aggregate => ExecutionMode::Groups,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraversalRequest {
    pub start: StartPredicate,
    pub operations: Vec<TraversalOp>,
    pub mode: ExecutionMode,
}

/// Edges touching result vertices, plus the far-end vertices that are not
/// themselves results. Used for subgraph post-processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default)]
    pub neighbors: Vec<Vertex>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVertices {
    pub starts: Vec<VertexId>,
    /// Every vertex on a surviving path; may repeat.
    pub hits: Vec<Vertex>,
    #[serde(default)]
    pub incident: Incident,
}

/// One path prefix of a tree traversal. `path` runs from the root to
/// `vertex` inclusive, so its length is the depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRow {
    pub path: Vec<VertexId>,
    pub vertex: Vertex,
    /// Relationship of the edge from the parent; `None` for roots.
    #[serde(default)]
    pub via: Option<Relationship>,
}

impl TreeRow {
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTree {
    pub rows: Vec<TreeRow>,
    #[serde(default)]
    pub incident: Incident,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RawResult {
    Vertices(RawVertices),
    Tree(RawTree),
    Groups(Vec<(String, u64)>),
}

impl RawResult {
    pub fn mode(&self) -> ExecutionMode {
        match self {
            RawResult::Vertices(_) => ExecutionMode::Vertices,
            RawResult::Tree(_) => ExecutionMode::Tree,
            RawResult::Groups(_) => ExecutionMode::Groups,
        }
    }
}
