// Edge Rule Catalog
//
// Answers "which edge connects these two node types" from an immutable set
// of schema rules. Every declared rule is reachable from both of its ends:
// looking up (B, A) finds a rule declared as (A, B) with its direction
// flipped.

use anyhow::{Context, Result as AnyResult};
use invgraph_common::{EdgeRule, NodeType, QueryError, Relationship};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct EdgeRuleCatalog {
    /// (from, to) -> rules in declaration order, oriented from -> to.
    index: HashMap<(NodeType, NodeType), Vec<EdgeRule>>,
    node_types: BTreeSet<NodeType>,
    declared: usize,
}

impl EdgeRuleCatalog {
    pub fn new(rules: Vec<EdgeRule>) -> Result<Self, QueryError> {
        let mut index: HashMap<(NodeType, NodeType), Vec<EdgeRule>> = HashMap::new();
        let mut node_types = BTreeSet::new();
        let declared = rules.len();

        for rule in rules {
            node_types.insert(rule.from.clone());
            node_types.insert(rule.to.clone());

            let forward = index.entry((rule.from.clone(), rule.to.clone())).or_default();
            if forward.iter().any(|r| r.label == rule.label && r.direction == rule.direction) {
                return Err(QueryError::InvalidSchema(format!(
                    "duplicate rule '{}' between '{}' and '{}'",
                    rule.label, rule.from, rule.to
                )));
            }
            forward.push(rule.clone());

            // Self-loops are already reachable from their only orientation.
            if rule.from != rule.to {
                let reversed = rule.reversed();
                index
                    .entry((reversed.from.clone(), reversed.to.clone()))
                    .or_default()
                    .push(reversed);
            }
        }

        for ((from, to), rules) in &index {
            let defaults = rules.iter().filter(|r| r.is_default).count();
            if defaults > 1 {
                return Err(QueryError::InvalidSchema(format!(
                    "{} default rules between '{}' and '{}'",
                    defaults, from, to
                )));
            }
        }

        tracing::debug!("Edge rule catalog built: {} rules over {} node types", declared, node_types.len());

        Ok(Self { index, node_types, declared })
    }

    pub fn from_json_str(raw: &str) -> AnyResult<Self> {
        let rules: Vec<EdgeRule> = serde_json::from_str(raw).context("Failed to parse edge rules")?;
        Ok(Self::new(rules)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read edge rules from {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    /// Resolve the single rule for travelling from `from` to `to`.
    ///
    /// A label hint narrows the candidates to that label. With several
    /// candidates left, the one marked default wins; if none is marked the
    /// lookup is ambiguous.
    pub fn resolve(&self, from: &NodeType, to: &NodeType, label_hint: Option<&str>) -> Result<EdgeRule, QueryError> {
        let candidates = self.candidates(from, to, label_hint, None);
        Self::select(from, to, label_hint, candidates)
    }

    /// Like [`resolve`](Self::resolve) but only containment rules qualify.
    pub fn resolve_containment(
        &self,
        from: &NodeType,
        to: &NodeType,
        label_hint: Option<&str>,
    ) -> Result<EdgeRule, QueryError> {
        let candidates = self.candidates(from, to, label_hint, Some(Relationship::Containment));
        Self::select(from, to, label_hint, candidates)
    }

    pub fn rules_between(&self, from: &NodeType, to: &NodeType) -> &[EdgeRule] {
        self.index
            .get(&(from.clone(), to.clone()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_types(&self) -> impl Iterator<Item = &NodeType> {
        self.node_types.iter()
    }

    pub fn contains_type(&self, node_type: &NodeType) -> bool {
        self.node_types.contains(node_type)
    }

    /// Number of declared rules (not counting reversed index entries).
    pub fn len(&self) -> usize {
        self.declared
    }

    pub fn is_empty(&self) -> bool {
        self.declared == 0
    }

    fn candidates(
        &self,
        from: &NodeType,
        to: &NodeType,
        label_hint: Option<&str>,
        relationship: Option<Relationship>,
    ) -> Vec<&EdgeRule> {
        self.rules_between(from, to)
            .iter()
            .filter(|r| label_hint.map_or(true, |l| r.label == l))
            .filter(|r| relationship.map_or(true, |k| r.relationship == k))
            .collect()
    }

    fn select(
        from: &NodeType,
        to: &NodeType,
        label_hint: Option<&str>,
        candidates: Vec<&EdgeRule>,
    ) -> Result<EdgeRule, QueryError> {
        match candidates.as_slice() {
            [] => Err(QueryError::NoEdgeRuleFound {
                from: from.to_string(),
                to: to.to_string(),
                label: label_hint.map(str::to_string),
            }),
            [only] => Ok((*only).clone()),
            many => {
                // At most one default per pair is guaranteed at construction.
                if let Some(default) = many.iter().find(|r| r.is_default) {
                    return Ok((*default).clone());
                }
                Err(QueryError::AmbiguousEdgeRule {
                    from: from.to_string(),
                    to: to.to_string(),
                    candidates: many.iter().map(|r| r.label.clone()).collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invgraph_common::Direction;

    fn nt(s: &str) -> NodeType {
        NodeType::from(s)
    }

    fn catalog() -> EdgeRuleCatalog {
        EdgeRuleCatalog::new(vec![
            EdgeRule::new("customer", "service-subscription", "subscribesTo", Direction::Out, Relationship::Containment),
            EdgeRule::new("pserver", "p-interface", "hasInterface", Direction::Out, Relationship::Containment),
            EdgeRule::new("generic-vnf", "pserver", "runsOnPserver", Direction::Out, Relationship::Peer).with_default(),
            EdgeRule::new("generic-vnf", "pserver", "hostedOn", Direction::Out, Relationship::Peer),
            EdgeRule::new("l-interface", "logical-link", "usesLink", Direction::Out, Relationship::Peer),
            EdgeRule::new("l-interface", "logical-link", "sourcedLink", Direction::Out, Relationship::Peer),
            EdgeRule::new("complex", "pserver", "locatedIn", Direction::In, Relationship::Peer),
        ])
        .expect("valid catalog")
    }

    #[test]
    fn test_resolve_single_rule() {
        let c = catalog();
        let rule = c.resolve(&nt("customer"), &nt("service-subscription"), None).expect("rule");
        assert_eq!(rule.label, "subscribesTo");
        assert_eq!(rule.direction, Direction::Out);
        assert_eq!(rule.relationship, Relationship::Containment);
    }

    #[test]
    fn test_resolve_reverse_orientation_flips_direction() {
        let c = catalog();
        let rule = c.resolve(&nt("service-subscription"), &nt("customer"), None).expect("rule");
        assert_eq!(rule.label, "subscribesTo");
        assert_eq!(rule.direction, Direction::In);
        assert_eq!(rule.from, nt("service-subscription"));

        let rule = c.resolve(&nt("pserver"), &nt("complex"), None).expect("rule");
        assert_eq!(rule.direction, Direction::Out);
    }

    #[test]
    fn test_unknown_type_is_no_rule_found() {
        let c = catalog();
        let err = c.resolve(&nt("pserver"), &nt("badtype"), None).unwrap_err();
        assert!(matches!(err, QueryError::NoEdgeRuleFound { ref from, ref to, label: None } if from == "pserver" && to == "badtype"));
    }

    #[test]
    fn test_default_breaks_tie() {
        let c = catalog();
        let rule = c.resolve(&nt("generic-vnf"), &nt("pserver"), None).expect("rule");
        assert_eq!(rule.label, "runsOnPserver");
        // Default status is kept for the reversed lookup too.
        let rule = c.resolve(&nt("pserver"), &nt("generic-vnf"), None).expect("rule");
        assert_eq!(rule.label, "runsOnPserver");
    }

    #[test]
    fn test_label_hint_beats_default() {
        let c = catalog();
        let rule = c.resolve(&nt("generic-vnf"), &nt("pserver"), Some("hostedOn")).expect("rule");
        assert_eq!(rule.label, "hostedOn");
    }

    #[test]
    fn test_ambiguous_without_default() {
        let c = catalog();
        let err = c.resolve(&nt("l-interface"), &nt("logical-link"), None).unwrap_err();
        match err {
            QueryError::AmbiguousEdgeRule { candidates, .. } => {
                assert_eq!(candidates, vec!["usesLink".to_string(), "sourcedLink".to_string()]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }

        let rule = c.resolve(&nt("l-interface"), &nt("logical-link"), Some("sourcedLink")).expect("rule");
        assert_eq!(rule.label, "sourcedLink");
    }

    #[test]
    fn test_label_hint_with_no_match() {
        let c = catalog();
        let err = c.resolve(&nt("customer"), &nt("service-subscription"), Some("nope")).unwrap_err();
        assert!(matches!(err, QueryError::NoEdgeRuleFound { label: Some(ref l), .. } if l == "nope"));
    }

    #[test]
    fn test_containment_rejects_peer_only_pair() {
        let c = catalog();
        let err = c.resolve_containment(&nt("complex"), &nt("pserver"), None).unwrap_err();
        assert!(matches!(err, QueryError::NoEdgeRuleFound { .. }));

        let rule = c.resolve_containment(&nt("pserver"), &nt("p-interface"), None).expect("rule");
        assert_eq!(rule.label, "hasInterface");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let c = catalog();
        let first = c.resolve(&nt("generic-vnf"), &nt("pserver"), None).expect("rule");
        for _ in 0..50 {
            assert_eq!(c.resolve(&nt("generic-vnf"), &nt("pserver"), None).expect("rule"), first);
        }
    }

    #[test]
    fn test_two_defaults_rejected() {
        let err = EdgeRuleCatalog::new(vec![
            EdgeRule::new("a", "b", "x", Direction::Out, Relationship::Peer).with_default(),
            EdgeRule::new("b", "a", "y", Direction::Out, Relationship::Peer).with_default(),
        ])
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidSchema(_)));
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let err = EdgeRuleCatalog::new(vec![
            EdgeRule::new("a", "b", "x", Direction::Out, Relationship::Peer),
            EdgeRule::new("a", "b", "x", Direction::Out, Relationship::Peer),
        ])
        .unwrap_err();
        assert!(matches!(err, QueryError::InvalidSchema(_)));
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"[{"from":"pserver","to":"p-interface","label":"hasInterface","direction":"OUT","relationship":"CONTAINMENT","multiplicity":"MANY"}]"#,
        )
        .expect("write rules");

        let c = EdgeRuleCatalog::from_json_file(&path).expect("catalog");
        assert_eq!(c.len(), 1);
        assert!(c.contains_type(&nt("p-interface")));
        assert_eq!(c.rules_between(&nt("p-interface"), &nt("pserver")).len(), 1);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = EdgeRuleCatalog::from_json_file("/nonexistent/rules.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read edge rules"));
    }
}
