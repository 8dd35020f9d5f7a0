pub mod in_process;
pub mod remote;
pub mod script;

pub use in_process::InProcessBackend;
pub use remote::RemoteBackend;
pub use script::{ScriptBackend, ScriptEngine};

use crate::graph::InMemoryGraph;
use crate::traversal::{RawResult, TraversalRequest};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use invgraph_common::config::{BackendConfig, BackendKind};
use invgraph_common::QueryError;
use std::sync::Arc;
use std::time::Duration;

/// Something that can run a compiled traversal.
#[async_trait]
pub trait TraversalBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn run(&self, request: &TraversalRequest) -> Result<RawResult, QueryError>;
}

/// Build the backend named by `config`. Local backends use `graph` when
/// given, otherwise they load `graph_path`.
pub fn create_backend(config: &BackendConfig, graph: Option<Arc<InMemoryGraph>>) -> Result<Arc<dyn TraversalBackend>> {
    match config.kind {
        BackendKind::Remote => {
            let url = config
                .remote_url
                .clone()
                .ok_or_else(|| anyhow!("backend.remote_url is required for the remote backend"))?;
            Ok(Arc::new(RemoteBackend::new(url, Duration::from_millis(config.timeout_ms))))
        }
        BackendKind::InProcess => Ok(Arc::new(InProcessBackend::new(local_graph(config, graph)?))),
        BackendKind::Script => Ok(Arc::new(ScriptBackend::new(local_graph(config, graph)?))),
    }
}

fn local_graph(config: &BackendConfig, graph: Option<Arc<InMemoryGraph>>) -> Result<Arc<InMemoryGraph>> {
    if let Some(graph) = graph {
        return Ok(graph);
    }
    let path = config
        .graph_path
        .as_deref()
        .ok_or_else(|| anyhow!("backend.graph_path is required for the {:?} backend", config.kind))?;
    let graph = InMemoryGraph::from_json_file(path)?;
    tracing::info!(
        "Loaded graph snapshot from {}: {} vertices, {} edges",
        path,
        graph.vertex_count(),
        graph.edge_count()
    );
    Ok(Arc::new(graph))
}
