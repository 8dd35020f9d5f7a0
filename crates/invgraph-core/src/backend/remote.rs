use super::TraversalBackend;
use crate::traversal::{RawResult, TraversalRequest};
use async_trait::async_trait;
use invgraph_common::config::BackendKind;
use invgraph_common::{QueryError, UnavailableCause};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Posts traversal requests as JSON to `{base_url}/traversal`.
pub struct RemoteBackend {
    client: Client,
    base_url: String,
}

impl RemoteBackend {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, base_url }
    }

    fn endpoint(&self) -> String {
        format!("{}/traversal", self.base_url.trim_end_matches('/'))
    }
}

fn transport_error(e: reqwest::Error) -> QueryError {
    let cause = if e.is_timeout() {
        UnavailableCause::Timeout
    } else {
        UnavailableCause::Connection
    };
    QueryError::unavailable(cause, e.to_string())
}

#[async_trait]
impl TraversalBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn run(&self, request: &TraversalRequest) -> Result<RawResult, QueryError> {
        let url = self.endpoint();
        tracing::debug!("Posting {} operations to {}", request.operations.len(), url);

        let res = self.client.post(&url).json(request).send().await.map_err(transport_error)?;

        let status = res.status();
        let body = res.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => QueryError::unavailable(UnavailableCause::Status(status.as_u16()), body),
                s if s.is_server_error() => QueryError::unavailable(UnavailableCause::Status(s.as_u16()), body),
                _ => QueryError::CompiledQueryRejected(format!("backend returned {}: {}", status, body)),
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| QueryError::CompiledQueryRejected(format!("undecodable backend response: {} - body: {}", e, body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::{ExecutionMode, RawVertices};
    use invgraph_common::{StartPredicate, Vertex, VertexId};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> TraversalRequest {
        TraversalRequest {
            start: StartPredicate::of_type("customer"),
            operations: vec![],
            mode: ExecutionMode::Vertices,
        }
    }

    #[tokio::test]
    async fn test_remote_success() {
        let mock_server = MockServer::start().await;
        let raw = RawResult::Vertices(RawVertices {
            starts: vec![VertexId(1)],
            hits: vec![Vertex::new(1, "customer")],
            ..Default::default()
        });

        Mock::given(method("POST"))
            .and(path("/traversal"))
            .and(body_partial_json(serde_json::json!({"mode": "vertices"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&raw))
            .mount(&mock_server)
            .await;

        let backend = RemoteBackend::new(format!("{}/", mock_server.uri()), Duration::from_secs(5));
        assert_eq!(backend.run(&request()).await.unwrap(), raw);
    }

    #[tokio::test]
    async fn test_remote_status_mapping() {
        let cases = [
            (422, false),
            (400, false),
            (503, true),
            (429, true),
        ];
        for (code, retryable) in cases {
            let mock_server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/traversal"))
                .respond_with(ResponseTemplate::new(code).set_body_string("nope"))
                .mount(&mock_server)
                .await;

            let backend = RemoteBackend::new(mock_server.uri(), Duration::from_secs(5));
            let err = backend.run(&request()).await.unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "status {}", code);
            if retryable {
                assert_eq!(
                    err,
                    QueryError::unavailable(UnavailableCause::Status(code), "nope"),
                );
            } else {
                assert!(matches!(err, QueryError::CompiledQueryRejected(_)));
            }
        }
    }

    #[tokio::test]
    async fn test_remote_bad_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/traversal"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&mock_server)
            .await;

        let backend = RemoteBackend::new(mock_server.uri(), Duration::from_secs(5));
        let err = backend.run(&request()).await.unwrap_err();
        assert!(matches!(err, QueryError::CompiledQueryRejected(msg) if msg.contains("undecodable")));
    }

    #[tokio::test]
    async fn test_remote_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/traversal"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let backend = RemoteBackend::new(mock_server.uri(), Duration::from_millis(100));
        let err = backend.run(&request()).await.unwrap_err();
        assert!(matches!(err, QueryError::BackendUnavailable { cause: UnavailableCause::Timeout, .. }));
    }

    #[tokio::test]
    async fn test_remote_connection_refused() {
        let backend = RemoteBackend::new("http://127.0.0.1:1".into(), Duration::from_secs(5));
        let err = backend.run(&request()).await.unwrap_err();
        assert!(matches!(err, QueryError::BackendUnavailable { cause: UnavailableCause::Connection, .. }));
    }
}
