use super::TraversalBackend;
use crate::graph::{interpreter, InMemoryGraph};
use crate::traversal::{RawResult, TraversalRequest};
use async_trait::async_trait;
use invgraph_common::config::BackendKind;
use invgraph_common::QueryError;
use std::sync::Arc;

/// Runs traversals directly against a shared in-memory graph.
pub struct InProcessBackend {
    graph: Arc<InMemoryGraph>,
}

impl InProcessBackend {
    pub fn new(graph: Arc<InMemoryGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &InMemoryGraph {
        &self.graph
    }
}

#[async_trait]
impl TraversalBackend for InProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InProcess
    }

    async fn run(&self, request: &TraversalRequest) -> Result<RawResult, QueryError> {
        interpreter::run(&self.graph, request)
    }
}
