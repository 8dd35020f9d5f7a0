// Result Assembler
//
// Shapes raw backend output into what callers consume: a deduplicated vertex
// set, a containment tree, or a grouped count map. Subgraph styles are
// applied here, after execution.

use crate::traversal::{ExecutionMode, Incident, RawResult, RawTree, RawVertices, TreeRow};
use invgraph_common::{QueryError, Relationship, ResultFormat, ResultStyle, SubgraphStyle, Vertex, VertexId};
use petgraph::graphmap::UnGraphMap;
use petgraph::visit::Bfs;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ResultShape {
    VertexSet(VertexSet),
    Tree(Tree),
    GroupMap(GroupMap),
}

impl ResultShape {
    pub fn as_vertex_set(&self) -> Option<&VertexSet> {
        match self {
            ResultShape::VertexSet(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            ResultShape::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_group_map(&self) -> Option<&GroupMap> {
        match self {
            ResultShape::GroupMap(g) => Some(g),
            _ => None,
        }
    }
}

/// Distinct result vertices keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VertexSet {
    pub vertices: BTreeMap<VertexId, Vertex>,
}

impl VertexSet {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn get(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn ids(&self) -> BTreeSet<VertexId> {
        self.vertices.keys().copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub vertex: Vertex,
    /// Relationship of the edge from the parent; `None` for roots.
    pub via: Option<Relationship>,
    pub children: BTreeMap<VertexId, TreeNode>,
}

impl TreeNode {
    fn leaf(vertex: Vertex, via: Option<Relationship>) -> Self {
        Self {
            vertex,
            via,
            children: BTreeMap::new(),
        }
    }

    fn collect_at<'a>(&'a self, depth: usize, target: usize, out: &mut BTreeMap<VertexId, &'a Vertex>) {
        if depth == target {
            out.insert(self.vertex.id, &self.vertex);
            return;
        }
        for child in self.children.values() {
            child.collect_at(depth + 1, target, out);
        }
    }

    fn collect_leaves<'a>(&'a self, out: &mut BTreeMap<VertexId, &'a Vertex>) {
        if self.children.is_empty() {
            out.insert(self.vertex.id, &self.vertex);
        }
        for child in self.children.values() {
            child.collect_leaves(out);
        }
    }

    fn find(&self, id: VertexId) -> Option<&TreeNode> {
        if self.vertex.id == id {
            return Some(self);
        }
        self.children.values().find_map(|c| c.find(id))
    }

    fn depth(&self) -> usize {
        1 + self.children.values().map(TreeNode::depth).max().unwrap_or(0)
    }

    fn visit_ids(&self, out: &mut BTreeSet<VertexId>) {
        out.insert(self.vertex.id);
        for child in self.children.values() {
            child.visit_ids(out);
        }
    }

    fn prune_peers(&mut self) {
        self.children.retain(|_, c| c.via != Some(Relationship::Peer));
        for child in self.children.values_mut() {
            child.prune_peers();
        }
    }

    fn add_peer_leaves(&mut self, ancestors: &mut Vec<VertexId>, peers: &HashMap<VertexId, Vec<&Vertex>>) {
        ancestors.push(self.vertex.id);
        for child in self.children.values_mut() {
            child.add_peer_leaves(ancestors, peers);
        }
        ancestors.pop();

        for peer in peers.get(&self.vertex.id).into_iter().flatten() {
            if ancestors.contains(&peer.id) || self.children.contains_key(&peer.id) {
                continue;
            }
            self.children
                .insert(peer.id, TreeNode::leaf((*peer).clone(), Some(Relationship::Peer)));
        }
    }
}

/// Containment tree; roots are the start vertices that reached a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tree {
    pub roots: BTreeMap<VertexId, TreeNode>,
}

impl Tree {
    /// Distinct vertices at `depth`, where roots are depth 1.
    pub fn objects_at_depth(&self, depth: usize) -> Vec<&Vertex> {
        let mut out = BTreeMap::new();
        if depth > 0 {
            for root in self.roots.values() {
                root.collect_at(1, depth, &mut out);
            }
        }
        out.into_values().collect()
    }

    /// Leaves of the subtree rooted at the first node holding `id`. A leaf
    /// node yields itself.
    pub fn leaf_objects_under(&self, id: VertexId) -> Vec<&Vertex> {
        let mut out = BTreeMap::new();
        if let Some(node) = self.roots.values().find_map(|r| r.find(id)) {
            node.collect_leaves(&mut out);
        }
        out.into_values().collect()
    }

    pub fn vertex_ids(&self) -> BTreeSet<VertexId> {
        let mut out = BTreeSet::new();
        for root in self.roots.values() {
            root.visit_ids(&mut out);
        }
        out
    }

    pub fn depth(&self) -> usize {
        self.roots.values().map(TreeNode::depth).max().unwrap_or(0)
    }

    fn from_rows(mut rows: Vec<TreeRow>) -> Result<Self, QueryError> {
        rows.sort_by_key(|r| r.depth());
        let mut tree = Tree::default();

        for row in rows {
            let Some((&last, parents)) = row.path.split_last() else {
                return Err(QueryError::CompiledQueryRejected("tree row with empty path".into()));
            };
            if last != row.vertex.id {
                return Err(QueryError::CompiledQueryRejected(format!(
                    "tree row path ends at {} but carries vertex {}",
                    last, row.vertex.id
                )));
            }

            let mut level = &mut tree.roots;
            for id in parents {
                level = match level.get_mut(id) {
                    Some(node) => &mut node.children,
                    None => {
                        return Err(QueryError::CompiledQueryRejected(format!(
                            "tree row for {} has no parent row for {}",
                            last, id
                        )))
                    }
                };
            }
            level.entry(last).or_insert_with(|| TreeNode::leaf(row.vertex, row.via));
        }
        Ok(tree)
    }
}

/// Aggregation counts ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupMap {
    pub counts: BTreeMap<String, u64>,
}

impl GroupMap {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counts.get(key).copied()
    }
}

impl fmt::Display for GroupMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (key, count)) in self.counts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, count)?;
        }
        f.write_str("]")
    }
}

/// Shape `raw` for `style`. `query` names the query in errors.
pub fn assemble(query: &str, raw: RawResult, style: ResultStyle) -> Result<ResultShape, QueryError> {
    let expected = ExecutionMode::from(style.format);
    if raw.mode() != expected {
        return Err(QueryError::CompiledQueryRejected(format!(
            "backend returned {:?} for a {:?} request",
            raw.mode(),
            expected
        )));
    }

    match raw {
        RawResult::Vertices(v) => Ok(ResultShape::VertexSet(vertex_set(v, style.subgraph))),
        RawResult::Tree(t) => Ok(ResultShape::Tree(tree(t, style.subgraph)?)),
        RawResult::Groups(pairs) => {
            if style.subgraph != SubgraphStyle::NoOp {
                return Err(QueryError::UnsupportedResultStyle {
                    query: query.to_string(),
                    reason: format!("{:?} subgraph cannot apply to an aggregate", style.subgraph),
                });
            }
            debug_assert_eq!(style.format, ResultFormat::Aggregate);
            let mut counts = BTreeMap::new();
            for (key, count) in pairs {
                *counts.entry(key).or_insert(0) += count;
            }
            Ok(ResultShape::GroupMap(GroupMap { counts }))
        }
    }
}

fn vertex_set(raw: RawVertices, subgraph: SubgraphStyle) -> VertexSet {
    let mut vertices: BTreeMap<VertexId, Vertex> = raw.hits.into_iter().map(|v| (v.id, v)).collect();

    match subgraph {
        SubgraphStyle::NoOp => {}
        SubgraphStyle::Prune => {
            let keep = containment_reachable(&raw.starts, &vertices, &raw.incident);
            vertices.retain(|id, _| keep.contains(id));
        }
        SubgraphStyle::Star => {
            let additions: Vec<Vertex> = peer_neighbors(&vertices.keys().copied().collect(), &raw.incident)
                .into_values()
                .flatten()
                .cloned()
                .collect();
            for v in additions {
                vertices.entry(v.id).or_insert(v);
            }
        }
    }

    VertexSet { vertices }
}

/// Hits reachable from the start vertices walking only containment edges
/// whose ends are both hits.
fn containment_reachable(
    starts: &[VertexId],
    hits: &BTreeMap<VertexId, Vertex>,
    incident: &Incident,
) -> BTreeSet<VertexId> {
    let mut graph: UnGraphMap<VertexId, ()> = UnGraphMap::new();
    for id in hits.keys() {
        graph.add_node(*id);
    }
    for edge in &incident.edges {
        if edge.relationship == Relationship::Containment && hits.contains_key(&edge.out_v) && hits.contains_key(&edge.in_v)
        {
            graph.add_edge(edge.out_v, edge.in_v, ());
        }
    }

    let mut keep = BTreeSet::new();
    for start in starts.iter().filter(|s| hits.contains_key(*s)) {
        if keep.contains(start) {
            continue;
        }
        let mut bfs = Bfs::new(&graph, *start);
        while let Some(id) = bfs.next(&graph) {
            keep.insert(id);
        }
    }
    keep
}

/// Peer-adjacent vertices of each id in `ids`, from incident edges.
fn peer_neighbors<'a>(ids: &BTreeSet<VertexId>, incident: &'a Incident) -> HashMap<VertexId, Vec<&'a Vertex>> {
    let by_id: HashMap<VertexId, &Vertex> = incident.neighbors.iter().map(|v| (v.id, v)).collect();
    let mut out: HashMap<VertexId, Vec<&Vertex>> = HashMap::new();
    for edge in incident.edges.iter().filter(|e| e.relationship == Relationship::Peer) {
        for (here, there) in [(edge.out_v, edge.in_v), (edge.in_v, edge.out_v)] {
            if !ids.contains(&here) {
                continue;
            }
            if let Some(v) = by_id.get(&there) {
                out.entry(here).or_default().push(*v);
            }
        }
    }
    out
}

fn tree(raw: RawTree, subgraph: SubgraphStyle) -> Result<Tree, QueryError> {
    let mut vertices: HashMap<VertexId, Vertex> = raw.rows.iter().map(|r| (r.vertex.id, r.vertex.clone())).collect();
    let mut tree = Tree::from_rows(raw.rows)?;

    match subgraph {
        SubgraphStyle::NoOp => {}
        SubgraphStyle::Prune => {
            for root in tree.roots.values_mut() {
                root.prune_peers();
            }
        }
        SubgraphStyle::Star => {
            // Tree vertices may themselves be peers of other tree vertices.
            let mut incident = raw.incident;
            for v in incident.neighbors.drain(..) {
                vertices.entry(v.id).or_insert(v);
            }
            incident.neighbors = vertices.into_values().collect();

            let peers = peer_neighbors(&tree.vertex_ids(), &incident);
            let mut ancestors = Vec::new();
            for root in tree.roots.values_mut() {
                root.add_peer_leaves(&mut ancestors, &peers);
            }
        }
    }
    Ok(tree)
}
