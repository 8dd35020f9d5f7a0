use invgraph_common::{ResultStyle, StartPredicate};
use invgraph_core::templates::FileTemplateSource;
use invgraph_core::{EdgeRuleCatalog, ExecutionEngine, InMemoryGraph, InProcessBackend, QueryService, TemplateStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn workspace_file(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").join(rel)
}

#[tokio::test]
async fn test_bundled_sample_files_run() {
    let catalog = EdgeRuleCatalog::from_json_file(workspace_file("schema/edge-rules.json")).unwrap();
    assert_eq!(catalog.len(), 9);

    let store = TemplateStore::default();
    store
        .reload(&FileTemplateSource::new(workspace_file("queries/stored-queries.json")))
        .await
        .unwrap();
    assert_eq!(store.snapshot().names(), vec!["customer-to-instance", "vnf-to-logical-link", "vnf-types"]);

    let graph = InMemoryGraph::from_json_file(workspace_file("data/graph.json")).unwrap();
    let engine = ExecutionEngine::new(Arc::new(InProcessBackend::new(Arc::new(graph))), Duration::from_secs(5));
    let service = QueryService::new(catalog, store, engine);

    let shape = service
        .run_query(
            "vnf-types",
            &HashMap::new(),
            &StartPredicate::of_type("service-instance"),
            ResultStyle::aggregate(),
        )
        .await
        .unwrap();
    assert_eq!(shape.as_group_map().unwrap().to_string(), "[vFW=1, vLB=1]");
}
