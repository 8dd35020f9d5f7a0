// Query Template Store
//
// Holds the named query templates as one immutable set. Reloads build and
// validate a complete new set before publishing it; a failed reload leaves
// the active set untouched.

mod poller;
mod source;

pub use poller::{spawn_template_poller, PollerHandle};
pub use source::{FileTemplateSource, HttpTemplateSource, StaticTemplateSource, TemplateDocument, TemplateSource};

use crate::snapshot::SnapshotCell;
use chrono::{DateTime, Utc};
use invgraph_common::{fingerprint, QueryError, QueryTemplate, Step};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// An immutable, validated collection of templates.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: HashMap<String, Arc<QueryTemplate>>,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
}

impl TemplateSet {
    pub fn new(templates: Vec<QueryTemplate>) -> Result<Self, QueryError> {
        let fingerprint = fingerprint(&templates);
        let mut map = HashMap::with_capacity(templates.len());
        for template in templates {
            validate(&template)?;
            let name = template.name.clone();
            if map.insert(name.clone(), Arc::new(template)).is_some() {
                return Err(QueryError::invalid_template(name, "declared more than once"));
            }
        }
        Ok(Self {
            templates: map,
            fingerprint,
            loaded_at: Utc::now(),
        })
    }

    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
            fingerprint: fingerprint(&[]),
            loaded_at: Utc::now(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<QueryTemplate>> {
        self.templates.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Structural checks that do not need the edge rule catalog.
fn validate(template: &QueryTemplate) -> Result<(), QueryError> {
    let fail = |reason: String| Err(QueryError::invalid_template(&template.name, reason));

    let mut declared = HashSet::new();
    for param in &template.params {
        if !declared.insert(param.name.as_str()) {
            return fail(format!("parameter '{}' declared more than once", param.name));
        }
    }

    if let Some(pos) = template.steps.iter().position(|s| matches!(s, Step::GroupCount { .. })) {
        if pos + 1 != template.steps.len() {
            return fail("group_count must be the last step".into());
        }
    }

    validate_steps(template, &template.steps, &declared, false)
}

fn validate_steps(
    template: &QueryTemplate,
    steps: &[Step],
    declared: &HashSet<&str>,
    in_branch: bool,
) -> Result<(), QueryError> {
    for step in steps {
        match step {
            Step::Where { param, .. } if !declared.contains(param.as_str()) => {
                return Err(QueryError::invalid_template(
                    &template.name,
                    format!("where step uses undeclared parameter '{}'", param),
                ));
            }
            Step::GroupCount { .. } if in_branch => {
                return Err(QueryError::invalid_template(&template.name, "group_count inside a branch"));
            }
            Step::Branch { branches } => {
                if branches.is_empty() || branches.iter().any(|b| b.is_empty()) {
                    return Err(QueryError::invalid_template(&template.name, "empty branch"));
                }
                for branch in branches {
                    validate_steps(template, branch, declared, true)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The fetched set matched the active fingerprint.
    Unchanged,
    Replaced { templates: usize, fingerprint: String },
}

/// Cloneable handle to the process-wide template set.
#[derive(Clone, Default)]
pub struct TemplateStore {
    cell: Arc<SnapshotCell<TemplateSet>>,
}

impl TemplateStore {
    pub fn new(set: TemplateSet) -> Self {
        Self {
            cell: Arc::new(SnapshotCell::new(set)),
        }
    }

    pub fn from_templates(templates: Vec<QueryTemplate>) -> Result<Self, QueryError> {
        Ok(Self::new(TemplateSet::new(templates)?))
    }

    pub fn get(&self, name: &str) -> Result<Arc<QueryTemplate>, QueryError> {
        self.snapshot()
            .get(name)
            .ok_or_else(|| QueryError::QueryNotFound { name: name.to_string() })
    }

    pub fn snapshot(&self) -> Arc<TemplateSet> {
        self.cell.load()
    }

    pub fn replace(&self, set: TemplateSet) {
        self.cell.replace(set);
    }

    /// Receiver that wakes whenever a new set is published.
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<Arc<TemplateSet>> {
        self.cell.subscribe()
    }

    /// Fetch from `source` and swap in the new set if it validates and
    /// differs from the active one.
    pub async fn reload(&self, source: &dyn TemplateSource) -> anyhow::Result<ReloadOutcome> {
        let result = self.try_reload(source).await;
        if let Err(e) = &result {
            tracing::error!("Template reload from {} failed, keeping previous set: {:?}", source.describe(), e);
        }
        result
    }

    async fn try_reload(&self, source: &dyn TemplateSource) -> anyhow::Result<ReloadOutcome> {
        let templates = source.fetch().await?;
        let set = TemplateSet::new(templates)?;

        if set.fingerprint() == self.snapshot().fingerprint() {
            tracing::debug!("Templates from {} unchanged", source.describe());
            return Ok(ReloadOutcome::Unchanged);
        }

        let outcome = ReloadOutcome::Replaced {
            templates: set.len(),
            fingerprint: set.fingerprint().to_string(),
        };
        tracing::info!("Loaded {} query templates from {}", set.len(), source.describe());
        self.replace(set);
        Ok(outcome)
    }
}
