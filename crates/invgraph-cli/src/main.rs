use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use invgraph_common::config::AppConfig;
use invgraph_common::{NodeType, ResultFormat, ResultStyle, StartPredicate, SubgraphStyle};
use invgraph_core::templates::{FileTemplateSource, HttpTemplateSource};
use invgraph_core::{
    create_backend, spawn_template_poller, EdgeRuleCatalog, ExecutionEngine, QueryService, TemplateSource, TemplateStore,
};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "invgraph", version, about = "Run stored inventory graph queries")]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "config",
        env = "INVGRAPH_CONFIG",
        help = "Config file name, without the .toml extension"
    )]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a named query and print the result as JSON
    Run(RunCmd),
    /// List the loaded query templates
    Templates,
    /// Show the edge rule that connects two node types
    Resolve(ResolveCmd),
    /// Keep templates in sync with their origin until interrupted
    Watch,
}

#[derive(Args, Debug)]
struct RunCmd {
    #[arg(value_name = "QUERY")]
    query: String,

    #[arg(long, value_name = "TYPE", help = "Node type of the start vertices")]
    start_type: Option<String>,

    #[arg(long = "start", value_name = "KEY=VALUE", help = "Start vertex property filter (repeatable)")]
    start: Vec<String>,

    #[arg(long = "param", value_name = "KEY=VALUE", help = "Query parameter (repeatable)")]
    params: Vec<String>,

    #[arg(long, value_enum, default_value_t = FormatArg::Vertices)]
    format: FormatArg,

    #[arg(long, value_enum, default_value_t = SubgraphArg::NoOp)]
    subgraph: SubgraphArg,
}

#[derive(Args, Debug)]
struct ResolveCmd {
    from: String,
    to: String,

    #[arg(long)]
    label: Option<String>,

    #[arg(long, help = "Only consider containment rules")]
    containment: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Vertices,
    Tree,
    Aggregate,
}

impl From<FormatArg> for ResultFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Vertices => ResultFormat::Vertices,
            FormatArg::Tree => ResultFormat::Tree,
            FormatArg::Aggregate => ResultFormat::Aggregate,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SubgraphArg {
    NoOp,
    Prune,
    Star,
}

impl From<SubgraphArg> for SubgraphStyle {
    fn from(arg: SubgraphArg) -> Self {
        match arg {
            SubgraphArg::NoOp => SubgraphStyle::NoOp,
            SubgraphArg::Prune => SubgraphStyle::Prune,
            SubgraphArg::Star => SubgraphStyle::Star,
        }
    }
}

/// `key=value`; the value is read as JSON when it parses, else as a string.
fn parse_pair(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn template_source(config: &AppConfig) -> Result<Arc<dyn TemplateSource>> {
    if let Some(url) = &config.templates.remote_url {
        return Ok(Arc::new(HttpTemplateSource::new(url.clone())));
    }
    let path = config
        .templates
        .path
        .as_deref()
        .ok_or_else(|| anyhow!("either templates.path or templates.remote_url must be set"))?;
    Ok(Arc::new(FileTemplateSource::new(path)))
}

async fn load_templates(config: &AppConfig) -> Result<TemplateStore> {
    let store = TemplateStore::default();
    let source = template_source(config)?;
    store.reload(source.as_ref()).await?;
    Ok(store)
}

fn load_catalog(config: &AppConfig) -> Result<EdgeRuleCatalog> {
    let catalog = EdgeRuleCatalog::from_json_file(&config.schema.edge_rules_path)?;
    tracing::info!(
        "Loaded {} edge rules from {}",
        catalog.len(),
        config.schema.edge_rules_path
    );
    Ok(catalog)
}

async fn run(config: AppConfig, cmd: RunCmd) -> Result<()> {
    let catalog = load_catalog(&config)?;
    let templates = load_templates(&config).await?;
    let backend = create_backend(&config.backend, None)?;
    let engine = ExecutionEngine::new(backend, config.backend_timeout());
    let service = QueryService::new(catalog, templates, engine);

    let mut start = StartPredicate {
        node_type: cmd.start_type.map(NodeType::from),
        properties: Vec::new(),
    };
    for raw in &cmd.start {
        start.properties.push(parse_pair(raw)?);
    }
    let params: HashMap<String, Value> = cmd.params.iter().map(|p| parse_pair(p)).collect::<Result<_>>()?;
    let style = ResultStyle {
        format: cmd.format.into(),
        subgraph: cmd.subgraph.into(),
    };

    let shape = service
        .run_query(&cmd.query, &params, &start, style)
        .await
        .with_context(|| format!("query '{}' failed", cmd.query))?;

    println!("{}", serde_json::to_string_pretty(&shape)?);
    Ok(())
}

async fn list_templates(config: AppConfig) -> Result<()> {
    let store = load_templates(&config).await?;
    let set = store.snapshot();
    println!("# {} templates, fingerprint {}", set.len(), set.fingerprint());
    for name in set.names() {
        if let Some(template) = set.get(name) {
            let params: Vec<String> = template
                .params
                .iter()
                .map(|p| if p.optional { format!("{}?", p.name) } else { p.name.clone() })
                .collect();
            println!("{}\tstart={}\tparams=[{}]", name, template.start_type, params.join(", "));
        }
    }
    Ok(())
}

async fn watch(config: AppConfig) -> Result<()> {
    let source = template_source(&config)?;
    let store = TemplateStore::default();
    let mut changes = store.subscribe();
    let poller = spawn_template_poller(store.clone(), source.clone(), config.poll_interval());
    tracing::info!(
        "Watching {} every {}s, Ctrl+C to stop",
        source.describe(),
        config.poll_interval().as_secs()
    );

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let set = changes.borrow_and_update().clone();
                println!("{}\t{} templates\t{}", set.loaded_at().to_rfc3339(), set.len(), set.fingerprint());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.shutdown().await;
    Ok(())
}

fn resolve(config: AppConfig, cmd: ResolveCmd) -> Result<()> {
    let catalog = load_catalog(&config)?;
    let (from, to) = (NodeType::from(cmd.from), NodeType::from(cmd.to));
    let rule = if cmd.containment {
        catalog.resolve_containment(&from, &to, cmd.label.as_deref())?
    } else {
        catalog.resolve(&from, &to, cmd.label.as_deref())?
    };
    println!("{}", serde_json::to_string_pretty(&rule)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded .env from: {:?}", path),
        Err(e) => tracing::debug!("No .env file loaded: {}", e),
    }

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config).context("Failed to load configuration")?;

    match cli.command {
        Command::Run(cmd) => run(config, cmd).await,
        Command::Templates => list_templates(config).await,
        Command::Resolve(cmd) => resolve(config, cmd),
        Command::Watch => watch(config).await,
    }
}
