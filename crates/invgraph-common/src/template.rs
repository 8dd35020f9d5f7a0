use crate::NodeType;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A parameter declared by a query template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
}

impl ParamDecl {
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), optional: false }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self { name: name.into(), optional: true }
    }
}

/// One abstract step of a query template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Property equality on the current vertex set.
    StartFilter { key: String, value: serde_json::Value },
    /// Traverse to `to`. `label` overrides rule selection; `containment`
    /// marks an ownership hop that must resolve to a containment rule.
    Hop {
        to: NodeType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default)]
        containment: bool,
    },
    Branch { branches: Vec<Vec<Step>> },
    /// Property equality against a bound parameter.
    Where { key: String, param: String },
    /// Terminal aggregation by property.
    GroupCount { key: String },
}

impl Step {
    pub fn hop(to: impl Into<NodeType>) -> Self {
        Step::Hop { to: to.into(), label: None, containment: false }
    }

    pub fn containment_hop(to: impl Into<NodeType>) -> Self {
        Step::Hop { to: to.into(), label: None, containment: true }
    }

    pub fn labelled_hop(to: impl Into<NodeType>, label: impl Into<String>) -> Self {
        Step::Hop { to: to.into(), label: Some(label.into()), containment: false }
    }

    pub fn filter(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Step::StartFilter { key: key.into(), value: value.into() }
    }

    pub fn where_param(key: impl Into<String>, param: impl Into<String>) -> Self {
        Step::Where { key: key.into(), param: param.into() }
    }

    pub fn group_count(key: impl Into<String>) -> Self {
        Step::GroupCount { key: key.into() }
    }

    pub fn branch(branches: Vec<Vec<Step>>) -> Self {
        Step::Branch { branches }
    }
}

/// A named, parameterized traversal recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    /// Node type of the vertices the caller's start predicate selects.
    pub start_type: NodeType,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    pub steps: Vec<Step>,
}

impl QueryTemplate {
    pub fn new(name: impl Into<String>, start_type: impl Into<NodeType>) -> Self {
        Self {
            name: name.into(),
            start_type: start_type.into(),
            params: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn param(mut self, decl: ParamDecl) -> Self {
        self.params.push(decl);
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn param_decl(&self, name: &str) -> Option<&ParamDecl> {
        self.params.iter().find(|p| p.name == name)
    }

    /// True if the template ends in a `GroupCount` aggregation.
    pub fn is_aggregate(&self) -> bool {
        matches!(self.steps.last(), Some(Step::GroupCount { .. }))
    }
}

/// Hex SHA-256 over the canonical JSON of `templates`, independent of
/// their order.
pub fn fingerprint(templates: &[QueryTemplate]) -> String {
    let mut sorted: Vec<&QueryTemplate> = templates.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = Sha256::new();
    for template in sorted {
        // Serializing plain data structs cannot fail.
        let bytes = serde_json::to_vec(template).unwrap_or_default();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    #[default]
    Vertices,
    Tree,
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubgraphStyle {
    #[default]
    NoOp,
    /// Keep only vertices reachable over containment edges from the start.
    Prune,
    /// Add the one-hop peer neighbours of every result vertex.
    Star,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ResultStyle {
    pub format: ResultFormat,
    #[serde(default)]
    pub subgraph: SubgraphStyle,
}

impl ResultStyle {
    pub fn vertices() -> Self {
        Self { format: ResultFormat::Vertices, subgraph: SubgraphStyle::NoOp }
    }

    pub fn tree() -> Self {
        Self { format: ResultFormat::Tree, subgraph: SubgraphStyle::NoOp }
    }

    pub fn aggregate() -> Self {
        Self { format: ResultFormat::Aggregate, subgraph: SubgraphStyle::NoOp }
    }

    pub fn with_subgraph(mut self, subgraph: SubgraphStyle) -> Self {
        self.subgraph = subgraph;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_json_shape() {
        let json = r#"{
            "name": "customer-to-instance",
            "start_type": "customer",
            "params": [{"name": "status", "optional": true}],
            "steps": [
                {"step": "hop", "to": "service-subscription", "containment": true},
                {"step": "hop", "to": "service-instance"},
                {"step": "where", "key": "orchestration-status", "param": "status"}
            ]
        }"#;
        let template: QueryTemplate = serde_json::from_str(json).expect("Failed to deserialize template");
        assert_eq!(template.steps.len(), 3);
        assert_eq!(template.steps[0], Step::containment_hop("service-subscription"));
        assert!(template.param_decl("status").map(|p| p.optional).unwrap_or(false));
        assert!(!template.is_aggregate());
    }

    #[test]
    fn test_aggregate_detection() {
        let template = QueryTemplate::new("vnf-types", "generic-vnf").step(Step::group_count("vnf-type"));
        assert!(template.is_aggregate());
    }

    #[test]
    fn test_fingerprint_ignores_order() {
        let a = QueryTemplate::new("a", "customer").step(Step::hop("service-subscription"));
        let b = QueryTemplate::new("b", "pserver").step(Step::hop("p-interface"));
        let fp1 = fingerprint(&[a.clone(), b.clone()]);
        let fp2 = fingerprint(&[b.clone(), a.clone()]);
        assert_eq!(fp1, fp2);
        assert_eq!(fp1.len(), 64);

        let changed = QueryTemplate::new("b", "pserver").step(Step::hop("lag-interface"));
        assert_ne!(fingerprint(&[a, changed]), fp1);
    }

    #[test]
    fn test_result_style_defaults() {
        let style: ResultStyle = serde_json::from_str(r#"{"format":"tree"}"#).expect("Failed to deserialize style");
        assert_eq!(style, ResultStyle::tree());
        assert_eq!(ResultStyle::default().subgraph, SubgraphStyle::NoOp);
    }
}
