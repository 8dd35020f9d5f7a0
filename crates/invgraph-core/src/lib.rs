pub mod assembler;
pub mod backend;
pub mod binder;
pub mod compiler;
pub mod engine;
pub mod graph;
pub mod schema;
pub mod service;
pub mod snapshot;
pub mod templates;
pub mod traversal;

pub use assembler::{assemble, GroupMap, ResultShape, Tree, TreeNode, VertexSet};
pub use backend::{create_backend, InProcessBackend, RemoteBackend, ScriptBackend, TraversalBackend};
pub use binder::{bind, Binding, BoundQuery};
pub use compiler::{compile, CompiledQuery};
pub use engine::ExecutionEngine;
pub use graph::{GraphSnapshot, InMemoryGraph};
pub use schema::EdgeRuleCatalog;
pub use service::QueryService;
pub use snapshot::SnapshotCell;
pub use templates::{spawn_template_poller, ReloadOutcome, TemplateSet, TemplateSource, TemplateStore};
pub use traversal::{ExecutionMode, RawResult, TraversalOp, TraversalRequest};

// Re-export common types for convenience
pub use invgraph_common::{
    EdgeRule, NodeType, QueryError, QueryTemplate, ResultFormat, ResultStyle, StartPredicate, Step, SubgraphStyle,
    Vertex, VertexId,
};
