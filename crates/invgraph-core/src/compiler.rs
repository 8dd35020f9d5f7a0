// Traversal Compiler
//
// Turns a bound query into concrete traversal operations by resolving every
// hop against the edge rule catalog. Pure: no backend is involved.

use crate::binder::{Binding, BoundQuery};
use crate::schema::EdgeRuleCatalog;
use crate::traversal::TraversalOp;
use invgraph_common::{NodeType, QueryError, Step};

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub name: String,
    pub operations: Vec<TraversalOp>,
    /// Ends in a `GroupCount`.
    pub aggregate: bool,
}

pub fn compile(bound: &BoundQuery, catalog: &EdgeRuleCatalog) -> Result<CompiledQuery, QueryError> {
    let template = bound.template();
    let compiler = Compiler { bound, catalog };

    // Rules for the first hop are resolved from `start_type`, so the start
    // vertices must actually have it whatever the caller's predicate says.
    let mut operations = vec![TraversalOp::HasType {
        node_type: template.start_type.clone(),
    }];
    let (body, _) = compiler.steps(&template.steps, Some(template.start_type.clone()), false)?;
    operations.extend(body);
    let aggregate = matches!(operations.last(), Some(TraversalOp::GroupCount { .. }));

    tracing::debug!(
        "Compiled query '{}' into {} operations (aggregate: {})",
        template.name,
        operations.len(),
        aggregate
    );

    Ok(CompiledQuery {
        name: template.name.clone(),
        operations,
        aggregate,
    })
}

struct Compiler<'a> {
    bound: &'a BoundQuery,
    catalog: &'a EdgeRuleCatalog,
}

impl Compiler<'_> {
    fn invalid(&self, reason: impl Into<String>) -> QueryError {
        QueryError::invalid_template(self.bound.name(), reason)
    }

    /// Compile `steps` starting from `current`. Returns the operations and
    /// the node type the sequence ends at; `None` when that type is not
    /// known (divergent branches).
    fn steps(
        &self,
        steps: &[Step],
        mut current: Option<NodeType>,
        in_branch: bool,
    ) -> Result<(Vec<TraversalOp>, Option<NodeType>), QueryError> {
        let mut ops = Vec::with_capacity(steps.len() * 2);

        for (i, step) in steps.iter().enumerate() {
            match step {
                Step::StartFilter { key, value } => ops.push(TraversalOp::HasProperty {
                    key: key.clone(),
                    value: value.clone(),
                }),
                Step::Hop { to, label, containment } => {
                    let from = current
                        .as_ref()
                        .ok_or_else(|| self.invalid(format!("hop to '{}' follows branches ending at different node types", to)))?;
                    let rule = if *containment {
                        self.catalog.resolve_containment(from, to, label.as_deref())?
                    } else {
                        self.catalog.resolve(from, to, label.as_deref())?
                    };
                    ops.push(TraversalOp::Traverse {
                        label: rule.label,
                        direction: rule.direction,
                        relationship: rule.relationship,
                    });
                    ops.push(TraversalOp::HasType { node_type: to.clone() });
                    current = Some(to.clone());
                }
                Step::Branch { branches } => {
                    if branches.is_empty() {
                        return Err(self.invalid("empty branch"));
                    }
                    let mut compiled = Vec::with_capacity(branches.len());
                    let mut ends = Vec::with_capacity(branches.len());
                    for branch in branches {
                        let (branch_ops, end) = self.steps(branch, current.clone(), true)?;
                        compiled.push(branch_ops);
                        ends.push(end);
                    }
                    current = match ends.split_first() {
                        Some((first, rest)) if first.is_some() && rest.iter().all(|e| e == first) => first.clone(),
                        _ => None,
                    };
                    ops.push(TraversalOp::Branch { branches: compiled });
                }
                Step::Where { key, param } => match self.bound.binding(param) {
                    Some(Binding::Value(value)) => ops.push(TraversalOp::HasProperty {
                        key: key.clone(),
                        value: value.clone(),
                    }),
                    Some(Binding::Absent) => {}
                    None => return Err(self.invalid(format!("where step uses undeclared parameter '{}'", param))),
                },
                Step::GroupCount { key } => {
                    if in_branch {
                        return Err(self.invalid("group_count inside a branch"));
                    }
                    if i + 1 != steps.len() {
                        return Err(self.invalid("group_count must be the last step"));
                    }
                    ops.push(TraversalOp::GroupCount { key: key.clone() });
                }
            }
        }

        Ok((ops, current))
    }
}
