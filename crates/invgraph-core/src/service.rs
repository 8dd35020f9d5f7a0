use crate::assembler::{assemble, ResultShape};
use crate::binder::bind;
use crate::compiler::compile;
use crate::engine::ExecutionEngine;
use crate::schema::EdgeRuleCatalog;
use crate::snapshot::SnapshotCell;
use crate::templates::TemplateStore;
use crate::traversal::ExecutionMode;
use invgraph_common::{QueryError, ResultFormat, ResultStyle, StartPredicate};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Caller-facing entry point: name + parameters in, shaped result out.
pub struct QueryService {
    rules: SnapshotCell<EdgeRuleCatalog>,
    templates: TemplateStore,
    engine: ExecutionEngine,
}

impl QueryService {
    pub fn new(catalog: EdgeRuleCatalog, templates: TemplateStore, engine: ExecutionEngine) -> Self {
        Self {
            rules: SnapshotCell::new(catalog),
            templates,
            engine,
        }
    }

    pub async fn run_query(
        &self,
        name: &str,
        params: &HashMap<String, Value>,
        start: &StartPredicate,
        style: ResultStyle,
    ) -> Result<ResultShape, QueryError> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("run_query", %request_id, query = name);
        self.run(name, params, start, style).instrument(span).await
    }

    async fn run(
        &self,
        name: &str,
        params: &HashMap<String, Value>,
        start: &StartPredicate,
        style: ResultStyle,
    ) -> Result<ResultShape, QueryError> {
        // One snapshot of each for the whole call.
        let catalog = self.rules.load();
        let template = self.templates.get(name)?;

        let aggregate = template.is_aggregate();
        let wants_aggregate = style.format == ResultFormat::Aggregate;
        if aggregate != wants_aggregate {
            let reason = if aggregate {
                format!("aggregate query cannot be returned as {:?}", style.format)
            } else {
                "only group_count queries can be returned as an aggregate".to_string()
            };
            return Err(QueryError::UnsupportedResultStyle {
                query: name.to_string(),
                reason,
            });
        }

        let bound = bind(template, params)?;
        let compiled = compile(&bound, &catalog)?;
        let raw = self.engine.execute(&compiled, start, ExecutionMode::from(style.format)).await?;
        let shape = assemble(name, raw, style)?;

        tracing::debug!("Query '{}' completed", name);
        Ok(shape)
    }

    /// Publish a new catalog. Calls already running keep the old one.
    pub fn replace_schema(&self, catalog: EdgeRuleCatalog) -> Arc<EdgeRuleCatalog> {
        tracing::info!("Replacing edge rule catalog ({} rules)", catalog.len());
        self.rules.replace(catalog)
    }

    pub fn schema(&self) -> Arc<EdgeRuleCatalog> {
        self.rules.load()
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }
}
