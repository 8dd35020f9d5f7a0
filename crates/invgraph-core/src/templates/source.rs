use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use invgraph_common::QueryTemplate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// On-disk and over-the-wire form of a template catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateDocument {
    pub queries: Vec<QueryTemplate>,
}

/// Where query templates come from.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Human-readable origin for logs.
    fn describe(&self) -> String;

    async fn fetch(&self) -> Result<Vec<QueryTemplate>>;
}

pub struct FileTemplateSource {
    path: PathBuf,
}

impl FileTemplateSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn fetch(&self) -> Result<Vec<QueryTemplate>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read templates from {}", self.path.display()))?;
        let doc: TemplateDocument = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse templates in {}", self.path.display()))?;
        Ok(doc.queries)
    }
}

pub struct HttpTemplateSource {
    url: String,
    client: Client,
}

impl HttpTemplateSource {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::builder().timeout(Duration::from_secs(10)).build().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl TemplateSource for HttpTemplateSource {
    fn describe(&self) -> String {
        format!("url {}", self.url)
    }

    async fn fetch(&self) -> Result<Vec<QueryTemplate>> {
        let res = self.client.get(&self.url).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(anyhow!("Template service error ({}): {}", status, body));
        }

        let doc: TemplateDocument = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse template document: {} - body: {}", e, body))?;
        Ok(doc.queries)
    }
}

/// In-memory origin; the held templates can be swapped at runtime.
#[derive(Default)]
pub struct StaticTemplateSource {
    templates: Mutex<Vec<QueryTemplate>>,
}

impl StaticTemplateSource {
    pub fn new(templates: Vec<QueryTemplate>) -> Self {
        Self {
            templates: Mutex::new(templates),
        }
    }

    pub fn set(&self, templates: Vec<QueryTemplate>) {
        let mut guard = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        *guard = templates;
    }
}

#[async_trait]
impl TemplateSource for StaticTemplateSource {
    fn describe(&self) -> String {
        "static templates".to_string()
    }

    async fn fetch(&self) -> Result<Vec<QueryTemplate>> {
        let guard = self.templates.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document() -> serde_json::Value {
        json!({
            "queries": [{
                "name": "pserver-interfaces",
                "start_type": "pserver",
                "steps": [{"step": "hop", "to": "p-interface", "containment": true}]
            }]
        })
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("queries.json");
        std::fs::write(&file, document().to_string()).expect("write");

        let source = FileTemplateSource::new(&file);
        let templates = source.fetch().await.expect("fetch");
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].name, "pserver-interfaces");
        assert!(source.describe().contains("queries.json"));
    }

    #[tokio::test]
    async fn test_file_source_bad_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("queries.json");
        std::fs::write(&file, "{ not json").expect("write");

        let err = FileTemplateSource::new(&file).fetch().await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse templates"));
    }

    #[tokio::test]
    async fn test_http_source_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/queries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document()))
            .mount(&mock_server)
            .await;

        let source = HttpTemplateSource::new(format!("{}/queries", mock_server.uri()));
        let templates = source.fetch().await.expect("fetch");
        assert_eq!(templates[0].start_type.as_str(), "pserver");
    }

    #[tokio::test]
    async fn test_http_source_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/queries"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&mock_server)
            .await;

        let source = HttpTemplateSource::new(format!("{}/queries", mock_server.uri()));
        let err = source.fetch().await.unwrap_err().to_string();
        assert!(err.contains("Template service error (503 Service Unavailable)"));
        assert!(err.contains("maintenance"));
    }
}
