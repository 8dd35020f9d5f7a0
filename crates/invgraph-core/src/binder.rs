use invgraph_common::{QueryError, QueryTemplate};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Value of a declared parameter after binding.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(Value),
    /// Optional parameter the caller did not supply. Steps using it are
    /// compiled away.
    Absent,
}

impl Binding {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Binding::Value(v) => Some(v),
            Binding::Absent => None,
        }
    }
}

/// A template together with a binding for every declared parameter.
#[derive(Debug, Clone)]
pub struct BoundQuery {
    template: Arc<QueryTemplate>,
    params: BTreeMap<String, Binding>,
}

impl BoundQuery {
    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn binding(&self, param: &str) -> Option<&Binding> {
        self.params.get(param)
    }

    pub fn bindings(&self) -> &BTreeMap<String, Binding> {
        &self.params
    }
}

pub fn bind(template: Arc<QueryTemplate>, supplied: &HashMap<String, Value>) -> Result<BoundQuery, QueryError> {
    let mut params = BTreeMap::new();

    for decl in &template.params {
        let binding = match supplied.get(&decl.name) {
            Some(value) => Binding::Value(value.clone()),
            None if decl.optional => Binding::Absent,
            None => {
                return Err(QueryError::MissingRequiredParameter {
                    query: template.name.clone(),
                    parameter: decl.name.clone(),
                })
            }
        };
        params.insert(decl.name.clone(), binding);
    }

    for name in supplied.keys() {
        if !params.contains_key(name) {
            tracing::debug!("Ignoring undeclared parameter '{}' for query '{}'", name, template.name);
        }
    }

    Ok(BoundQuery { template, params })
}
