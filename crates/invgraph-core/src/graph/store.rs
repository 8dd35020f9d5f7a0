use anyhow::{anyhow, Context, Result};
use invgraph_common::{EdgeRecord, Relationship, StartPredicate, Vertex, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Serialized form of an in-memory graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

/// Property graph held in process memory, with out/in adjacency indexes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraph {
    vertices: HashMap<VertexId, Vertex>,
    edges: Vec<EdgeRecord>,
    outgoing: HashMap<VertexId, Vec<usize>>,
    incoming: HashMap<VertexId, Vec<usize>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut graph = Self::new();
        for vertex in snapshot.vertices {
            graph.add_vertex(vertex);
        }
        for edge in snapshot.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph snapshot from {}", path.display()))?;
        let snapshot: GraphSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse graph snapshot {}", path.display()))?;
        Self::from_snapshot(snapshot)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let mut vertices: Vec<Vertex> = self.vertices.values().cloned().collect();
        vertices.sort_by_key(|v| v.id);
        GraphSnapshot { vertices, edges: self.edges.clone() }
    }

    pub fn add_vertex(&mut self, vertex: Vertex) {
        self.vertices.insert(vertex.id, vertex);
    }

    pub fn add_edge(&mut self, edge: EdgeRecord) -> Result<()> {
        for end in [edge.out_v, edge.in_v] {
            if !self.vertices.contains_key(&end) {
                return Err(anyhow!("edge '{}' references unknown vertex {}", edge.label, end));
            }
        }
        let idx = self.edges.len();
        self.outgoing.entry(edge.out_v).or_default().push(idx);
        self.incoming.entry(edge.in_v).or_default().push(idx);
        self.edges.push(edge);
        Ok(())
    }

    /// Shorthand for [`add_edge`](Self::add_edge).
    pub fn connect(&mut self, out_v: u64, in_v: u64, label: &str, relationship: Relationship) -> Result<()> {
        self.add_edge(EdgeRecord {
            out_v: VertexId(out_v),
            in_v: VertexId(in_v),
            label: label.to_string(),
            relationship,
        })
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertices satisfying `predicate`, ordered by id.
    pub fn vertices_matching(&self, predicate: &StartPredicate) -> Vec<&Vertex> {
        let mut found: Vec<&Vertex> = self.vertices.values().filter(|v| predicate.matches(v)).collect();
        found.sort_by_key(|v| v.id);
        found
    }

    pub fn outgoing_edges(&self, id: VertexId) -> impl Iterator<Item = &EdgeRecord> {
        self.edge_refs(&self.outgoing, id)
    }

    pub fn incoming_edges(&self, id: VertexId) -> impl Iterator<Item = &EdgeRecord> {
        self.edge_refs(&self.incoming, id)
    }

    /// All edges touching `id`; a self-loop is reported once.
    pub fn incident_edges(&self, id: VertexId) -> impl Iterator<Item = &EdgeRecord> {
        self.outgoing_edges(id)
            .chain(self.incoming_edges(id).filter(move |e| e.out_v != id))
    }

    /// Outgoing edges for a whole frontier in one pass.
    pub fn batch_outgoing_edges(&self, sources: &[VertexId]) -> HashMap<VertexId, Vec<&EdgeRecord>> {
        sources
            .iter()
            .map(|id| (*id, self.outgoing_edges(*id).collect()))
            .collect()
    }

    /// Incoming edges for a whole frontier in one pass.
    pub fn batch_incoming_edges(&self, targets: &[VertexId]) -> HashMap<VertexId, Vec<&EdgeRecord>> {
        targets
            .iter()
            .map(|id| (*id, self.incoming_edges(*id).collect()))
            .collect()
    }

    fn edge_refs<'a>(
        &'a self,
        index: &'a HashMap<VertexId, Vec<usize>>,
        id: VertexId,
    ) -> impl Iterator<Item = &'a EdgeRecord> + 'a {
        index
            .get(&id)
            .into_iter()
            .flat_map(move |idxs| idxs.iter().map(move |i| &self.edges[*i]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> InMemoryGraph {
        let mut g = InMemoryGraph::new();
        g.add_vertex(Vertex::new(1, "customer"));
        g.add_vertex(Vertex::new(2, "service-subscription"));
        g.add_vertex(Vertex::new(3, "service-instance"));
        g.connect(1, 2, "subscribesTo", Relationship::Containment).unwrap();
        g.connect(2, 3, "hasInstance", Relationship::Containment).unwrap();
        g
    }

    #[test]
    fn test_adjacency() {
        let g = small_graph();
        assert_eq!(g.outgoing_edges(VertexId(1)).count(), 1);
        assert_eq!(g.incoming_edges(VertexId(1)).count(), 0);
        assert_eq!(g.incident_edges(VertexId(2)).count(), 2);

        let batch = g.batch_outgoing_edges(&[VertexId(1), VertexId(2), VertexId(3)]);
        assert_eq!(batch[&VertexId(1)][0].in_v, VertexId(2));
        assert!(batch[&VertexId(3)].is_empty());

        let batch = g.batch_incoming_edges(&[VertexId(3)]);
        assert_eq!(batch[&VertexId(3)][0].label, "hasInstance");
    }

    #[test]
    fn test_edge_to_unknown_vertex_rejected() {
        let mut g = small_graph();
        let err = g.connect(1, 99, "bogus", Relationship::Peer).unwrap_err();
        assert!(err.to_string().contains("unknown vertex v99"));
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn test_self_loop_reported_once() {
        let mut g = InMemoryGraph::new();
        g.add_vertex(Vertex::new(1, "vlan"));
        g.connect(1, 1, "loops", Relationship::Peer).unwrap();
        assert_eq!(g.incident_edges(VertexId(1)).count(), 1);
    }

    #[test]
    fn test_matching_is_ordered() {
        let g = small_graph();
        let all = g.vertices_matching(&StartPredicate::default());
        let ids: Vec<u64> = all.iter().map(|v| v.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_snapshot_file_round_trip() {
        let g = small_graph();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("graph.json");
        std::fs::write(&path, serde_json::to_string(&g.snapshot()).unwrap()).unwrap();

        let loaded = InMemoryGraph::from_json_file(&path).expect("load graph");
        assert_eq!(loaded.vertex_count(), 3);
        assert_eq!(loaded.edge_count(), 2);
        assert_eq!(loaded.vertex(VertexId(2)).map(|v| v.node_type.as_str()), Some("service-subscription"));
    }
}
