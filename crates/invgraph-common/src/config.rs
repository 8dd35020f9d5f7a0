use serde::{Deserialize, Serialize};
use config::{Config, ConfigError, Environment, File};

// --- Constants for Default Configuration ---
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TEMPLATE_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_EDGE_RULES_PATH: &str = "./schema/edge-rules.json";
pub const DEFAULT_TEMPLATES_PATH: &str = "./queries/stored-queries.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Traversals run against an in-process graph.
    InProcess,
    /// Traversals are posted to a remote traversal service.
    Remote,
    /// Traversals are rendered to script text and evaluated locally.
    Script,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Graph snapshot used by the in-process and script backends.
    #[serde(default)]
    pub graph_path: Option<String>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_BACKEND_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default)]
    pub path: Option<String>,
    /// When set, templates are fetched from this URL instead of `path`.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_TEMPLATE_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub edge_rules_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub templates: TemplateConfig,
    pub schema: SchemaConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::InProcess,
            remote_url: None,
            timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            graph_path: None,
        }
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: Some(DEFAULT_TEMPLATES_PATH.into()),
            remote_url: None,
            poll_interval_secs: DEFAULT_TEMPLATE_POLL_INTERVAL_SECS,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            edge_rules_path: DEFAULT_EDGE_RULES_PATH.into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            templates: TemplateConfig::default(),
            schema: SchemaConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load defaults, then `<name>.toml` if present, then `INVGRAPH_*`
    /// environment overrides.
    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("backend.kind", "in_process")?
            .set_default("backend.timeout_ms", DEFAULT_BACKEND_TIMEOUT_MS)?
            .set_default("templates.path", DEFAULT_TEMPLATES_PATH)?
            .set_default("templates.poll_interval_secs", DEFAULT_TEMPLATE_POLL_INTERVAL_SECS)?
            .set_default("schema.edge_rules_path", DEFAULT_EDGE_RULES_PATH)?

            // File: config.toml
            .add_source(File::with_name(name).required(false))

            // Environment: INVGRAPH_BACKEND__KIND=remote -> backend.kind=remote
            .add_source(Environment::with_prefix("INVGRAPH").separator("__"))

            .build()?;

        s.try_deserialize()
    }

    pub fn backend_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.backend.timeout_ms)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.templates.poll_interval_secs.max(1))
    }
}
