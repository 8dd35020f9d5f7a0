// Traversal Interpreter - runs compiled operations over an InMemoryGraph
//
// Each traverser carries the path it walked. Traverse steps expand the whole
// frontier at once with the batch adjacency API rather than per traverser.

use super::store::InMemoryGraph;
use crate::traversal::{ExecutionMode, Incident, RawResult, RawTree, RawVertices, TraversalOp, TraversalRequest, TreeRow};
use invgraph_common::{value_key, Direction, EdgeRecord, QueryError, Relationship, Vertex, VertexId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
struct Traverser {
    path: Vec<VertexId>,
    /// Relationship of the edge leading to each path element.
    via: Vec<Option<Relationship>>,
}

impl Traverser {
    fn start(id: VertexId) -> Self {
        Self { path: vec![id], via: vec![None] }
    }

    fn current(&self) -> VertexId {
        // Paths are never empty: they start with the start vertex.
        self.path[self.path.len() - 1]
    }

    fn step(&self, next: VertexId, relationship: Relationship) -> Self {
        let mut t = self.clone();
        t.path.push(next);
        t.via.push(Some(relationship));
        t
    }
}

/// Run `request` against `graph`.
pub fn run(graph: &InMemoryGraph, request: &TraversalRequest) -> Result<RawResult, QueryError> {
    let (body, group_key) = split_terminal(&request.operations, request.mode)?;

    let starts: Vec<VertexId> = graph.vertices_matching(&request.start).iter().map(|v| v.id).collect();
    let traversers = starts.iter().map(|id| Traverser::start(*id)).collect();
    let survivors = apply(graph, body, traversers)?;

    tracing::debug!(
        "Interpreted {} ops from {} start vertices: {} surviving paths",
        request.operations.len(),
        starts.len(),
        survivors.len()
    );

    match request.mode {
        ExecutionMode::Vertices => Ok(RawResult::Vertices(collect_vertices(graph, starts, &survivors)?)),
        ExecutionMode::Tree => Ok(RawResult::Tree(collect_tree(graph, &survivors)?)),
        ExecutionMode::Groups => {
            let key = group_key.ok_or_else(|| {
                QueryError::CompiledQueryRejected("groups mode requires a terminal group_count".into())
            })?;
            Ok(RawResult::Groups(group_count(graph, &survivors, key)?))
        }
    }
}

/// Separate a trailing `GroupCount` from the body and check that none
/// appears anywhere else.
fn split_terminal(ops: &[TraversalOp], mode: ExecutionMode) -> Result<(&[TraversalOp], Option<&str>), QueryError> {
    let (body, key) = match ops.split_last() {
        Some((TraversalOp::GroupCount { key }, body)) => (body, Some(key.as_str())),
        _ => (ops, None),
    };
    if contains_group_count(body) {
        return Err(QueryError::CompiledQueryRejected("group_count must be the final operation".into()));
    }
    if key.is_some() && mode != ExecutionMode::Groups {
        return Err(QueryError::CompiledQueryRejected(format!(
            "group_count cannot run in {:?} mode",
            mode
        )));
    }
    Ok((body, key))
}

fn contains_group_count(ops: &[TraversalOp]) -> bool {
    ops.iter().any(|op| match op {
        TraversalOp::GroupCount { .. } => true,
        TraversalOp::Branch { branches } => branches.iter().any(|b| contains_group_count(b)),
        _ => false,
    })
}

fn apply(graph: &InMemoryGraph, ops: &[TraversalOp], mut traversers: Vec<Traverser>) -> Result<Vec<Traverser>, QueryError> {
    for op in ops {
        if traversers.is_empty() {
            break;
        }
        traversers = match op {
            TraversalOp::HasProperty { key, value } => traversers
                .into_iter()
                .filter(|t| vertex(graph, t.current()).map_or(false, |v| v.has_property(key, value)))
                .collect(),
            TraversalOp::HasType { node_type } => traversers
                .into_iter()
                .filter(|t| vertex(graph, t.current()).map_or(false, |v| &v.node_type == node_type))
                .collect(),
            TraversalOp::Traverse {
                label,
                direction,
                relationship,
            } => expand(graph, traversers, label, *direction, *relationship),
            TraversalOp::Branch { branches } => {
                let mut out = Vec::new();
                for t in traversers {
                    for branch in branches {
                        out.extend(apply(graph, branch, vec![t.clone()])?);
                    }
                }
                out
            }
            TraversalOp::GroupCount { .. } => {
                return Err(QueryError::CompiledQueryRejected("unexpected group_count".into()));
            }
        };
    }
    Ok(traversers)
}

/// Follow edges carrying both `label` and `relationship`.
fn expand(
    graph: &InMemoryGraph,
    traversers: Vec<Traverser>,
    label: &str,
    direction: Direction,
    relationship: Relationship,
) -> Vec<Traverser> {
    let frontier: Vec<VertexId> = traversers
        .iter()
        .map(|t| t.current())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let outgoing = match direction {
        Direction::Out | Direction::Both => graph.batch_outgoing_edges(&frontier),
        Direction::In => HashMap::new(),
    };
    let incoming = match direction {
        Direction::In | Direction::Both => graph.batch_incoming_edges(&frontier),
        Direction::Out => HashMap::new(),
    };

    let mut next = Vec::new();
    for t in &traversers {
        let here = t.current();
        let out_edges = outgoing.get(&here).into_iter().flatten().map(|e| (e, e.in_v));
        let in_edges = incoming.get(&here).into_iter().flatten().map(|e| (e, e.out_v));
        for (edge, target) in out_edges.chain(in_edges) {
            if edge.label == label && edge.relationship == relationship {
                next.push(t.step(target, edge.relationship));
            }
        }
    }
    next
}

fn vertex(graph: &InMemoryGraph, id: VertexId) -> Result<&Vertex, QueryError> {
    graph
        .vertex(id)
        .ok_or_else(|| QueryError::CompiledQueryRejected(format!("traversal reached missing vertex {}", id)))
}

fn collect_vertices(graph: &InMemoryGraph, starts: Vec<VertexId>, survivors: &[Traverser]) -> Result<RawVertices, QueryError> {
    let mut hits = Vec::new();
    for t in survivors {
        for id in &t.path {
            hits.push(vertex(graph, *id)?.clone());
        }
    }
    let ids: BTreeSet<VertexId> = hits.iter().map(|v| v.id).collect();
    Ok(RawVertices {
        starts,
        hits,
        incident: incident(graph, &ids)?,
    })
}

fn collect_tree(graph: &InMemoryGraph, survivors: &[Traverser]) -> Result<RawTree, QueryError> {
    let mut seen: HashSet<Vec<VertexId>> = HashSet::new();
    let mut rows = Vec::new();
    for t in survivors {
        for depth in 1..=t.path.len() {
            let prefix = t.path[..depth].to_vec();
            if !seen.insert(prefix.clone()) {
                continue;
            }
            rows.push(TreeRow {
                vertex: vertex(graph, prefix[depth - 1])?.clone(),
                via: t.via[depth - 1],
                path: prefix,
            });
        }
    }
    let ids: BTreeSet<VertexId> = rows.iter().map(|r| r.vertex.id).collect();
    Ok(RawTree {
        rows,
        incident: incident(graph, &ids)?,
    })
}

fn incident(graph: &InMemoryGraph, ids: &BTreeSet<VertexId>) -> Result<Incident, QueryError> {
    let mut seen_edges: HashSet<&EdgeRecord> = HashSet::new();
    let mut edges = Vec::new();
    let mut neighbors: BTreeMap<VertexId, Vertex> = BTreeMap::new();

    for id in ids {
        for edge in graph.incident_edges(*id) {
            if !seen_edges.insert(edge) {
                continue;
            }
            edges.push(edge.clone());
            let other = edge.other_end(*id);
            if !ids.contains(&other) && !neighbors.contains_key(&other) {
                neighbors.insert(other, vertex(graph, other)?.clone());
            }
        }
    }

    Ok(Incident {
        edges,
        neighbors: neighbors.into_values().collect(),
    })
}

fn group_count(graph: &InMemoryGraph, survivors: &[Traverser], key: &str) -> Result<Vec<(String, u64)>, QueryError> {
    let finals: BTreeSet<VertexId> = survivors.iter().map(|t| t.current()).collect();
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for id in finals {
        if let Some(value) = vertex(graph, id)?.property(key) {
            *counts.entry(value_key(&value)).or_insert(0) += 1;
        }
    }
    Ok(counts.into_iter().collect())
}
