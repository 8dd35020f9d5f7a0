use crate::backend::TraversalBackend;
use crate::compiler::CompiledQuery;
use crate::traversal::{ExecutionMode, RawResult, TraversalRequest};
use invgraph_common::{QueryError, StartPredicate, UnavailableCause};
use std::sync::Arc;
use std::time::Duration;

/// Runs compiled queries on a backend, bounded by a timeout.
#[derive(Clone)]
pub struct ExecutionEngine {
    backend: Arc<dyn TraversalBackend>,
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(backend: Arc<dyn TraversalBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &Arc<dyn TraversalBackend> {
        &self.backend
    }

    pub async fn execute(
        &self,
        compiled: &CompiledQuery,
        start: &StartPredicate,
        mode: ExecutionMode,
    ) -> Result<RawResult, QueryError> {
        let request = TraversalRequest {
            start: start.clone(),
            operations: compiled.operations.clone(),
            mode,
        };

        tracing::debug!(
            "Executing '{}' on {:?} backend ({} ops, {:?} mode)",
            compiled.name,
            self.backend.kind(),
            request.operations.len(),
            mode
        );

        let result = match tokio::time::timeout(self.timeout, self.backend.run(&request)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::unavailable(
                UnavailableCause::Timeout,
                format!("no response within {}ms", self.timeout.as_millis()),
            )),
        };

        if let Err(e @ QueryError::CompiledQueryRejected(_)) = &result {
            tracing::error!("Backend rejected compiled query '{}': {}", compiled.name, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::RawVertices;
    use async_trait::async_trait;
    use invgraph_common::config::BackendKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowBackend {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TraversalBackend for SlowBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Remote
        }

        async fn run(&self, _request: &TraversalRequest) -> Result<RawResult, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(RawResult::Vertices(RawVertices::default()))
        }
    }

    fn compiled() -> CompiledQuery {
        CompiledQuery {
            name: "q".into(),
            operations: vec![],
            aggregate: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_unavailable() {
        let backend = Arc::new(SlowBackend {
            delay: Duration::from_secs(60),
            calls: AtomicUsize::new(0),
        });
        let engine = ExecutionEngine::new(backend.clone(), Duration::from_secs(1));

        let err = engine
            .execute(&compiled(), &StartPredicate::default(), ExecutionMode::Vertices)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::BackendUnavailable { cause: UnavailableCause::Timeout, .. }));
        assert!(err.is_retryable());
        // No retries.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_backend_passes_through() {
        let backend = Arc::new(SlowBackend {
            delay: Duration::from_millis(10),
            calls: AtomicUsize::new(0),
        });
        let engine = ExecutionEngine::new(backend, Duration::from_secs(1));
        let raw = engine
            .execute(&compiled(), &StartPredicate::default(), ExecutionMode::Vertices)
            .await
            .unwrap();
        assert_eq!(raw.mode(), ExecutionMode::Vertices);
    }
}
