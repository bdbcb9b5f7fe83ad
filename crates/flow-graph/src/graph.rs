//! The in-memory graph representation built by the loader and consumed by
//! the compiler and executor (spec §3, §9 "Graph as networkx multigraph").
//!
//! Modeled as an adjacency structure rather than a generic graph library:
//! `nodes` holds each node's immutable spec plus its per-run data, and
//! `out_edges`/`in_edges` hold edges as owned values keyed by their
//! endpoint. Parallel edges between the same pair of nodes are permitted as
//! long as they land on distinct handles (spec §3 "Graph").

use std::collections::HashMap;

use flow_core::{NodeData, NodeId, NodeSpec};

/// A directed connection from one node's output handle to another's input
/// handle.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: String,
    pub target_handle: String,
}

/// A node's immutable spec paired with its mutable per-run data. Only
/// descriptors live here; the concrete `Node` implementation is looked up by
/// `type_name` via the registry at execution time (spec §9 "Cycles in node
/// metadata").
pub struct NodeEntry {
    pub spec: NodeSpec,
    pub data: NodeData,
    pub type_name: String,
    /// Executor-recognized role, e.g. `"router"`, `"chat_input"`,
    /// `"chat_output"` (spec §4.6.2, §4.6.5).
    pub label: Option<String>,
}

/// The directed multigraph of nodes and edges (component of C3/C4).
#[derive(Default)]
pub struct Graph {
    nodes: HashMap<NodeId, NodeEntry>,
    out_edges: HashMap<NodeId, Vec<Edge>>,
    in_edges: HashMap<NodeId, Vec<Edge>>,
    /// Preserves the order nodes were added in, for deterministic iteration
    /// where ordering isn't otherwise constrained (e.g. layer-0 seeding).
    order: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, spec: NodeSpec, data: NodeData, type_name: impl Into<String>, label: Option<String>) {
        if !self.nodes.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.nodes.insert(id.clone(), NodeEntry { spec, data, type_name: type_name.into(), label });
        self.out_edges.entry(id.clone()).or_default();
        self.in_edges.entry(id).or_default();
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.out_edges.entry(edge.source.clone()).or_default().push(edge.clone());
        self.in_edges.entry(edge.target.clone()).or_default().push(edge);
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeEntry> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut NodeEntry> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.out_edges.values().map(|v| v.len()).sum()
    }

    pub fn out_edges(&self, id: &NodeId) -> &[Edge] {
        self.out_edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn in_edges(&self, id: &NodeId) -> &[Edge] {
        self.in_edges.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn in_degree(&self, id: &NodeId) -> usize {
        self.in_edges(id).len()
    }

    pub fn successors(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.out_edges(id).iter().map(|e| &e.target)
    }

    pub fn predecessors(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.in_edges(id).iter().map(|e| &e.source)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Removes nodes with no incident edges (used by the `remove_standalone`
    /// compiler pre-pass, spec §4.4).
    pub fn remove_standalone_nodes(&mut self) {
        let standalone: Vec<NodeId> = self
            .order
            .iter()
            .filter(|id| self.in_edges(id).is_empty() && self.out_edges(id).is_empty())
            .cloned()
            .collect();

        for id in standalone {
            self.nodes.remove(&id);
            self.out_edges.remove(&id);
            self.in_edges.remove(&id);
            self.order.retain(|n| n != &id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> NodeSpec {
        NodeSpec::new("t", "t", vec![], vec![], vec![]).unwrap()
    }

    #[test]
    fn edges_are_queryable_by_endpoint() {
        let mut g = Graph::new();
        g.add_node(NodeId::from("a"), spec(), NodeData::new(), "t", None);
        g.add_node(NodeId::from("b"), spec(), NodeData::new(), "t", None);
        g.add_edge(Edge {
            id: "e1".into(),
            source: NodeId::from("a"),
            target: NodeId::from("b"),
            source_handle: "out".into(),
            target_handle: "in".into(),
        });

        assert_eq!(g.out_edges(&NodeId::from("a")).len(), 1);
        assert_eq!(g.in_degree(&NodeId::from("b")), 1);
        assert_eq!(g.successors(&NodeId::from("a")).next(), Some(&NodeId::from("b")));
    }

    #[test]
    fn remove_standalone_drops_disconnected_nodes() {
        let mut g = Graph::new();
        g.add_node(NodeId::from("a"), spec(), NodeData::new(), "t", None);
        g.add_node(NodeId::from("b"), spec(), NodeData::new(), "t", None);
        g.add_edge(Edge {
            id: "e1".into(),
            source: NodeId::from("a"),
            target: NodeId::from("b"),
            source_handle: "out".into(),
            target_handle: "in".into(),
        });
        g.add_node(NodeId::from("orphan"), spec(), NodeData::new(), "t", None);

        g.remove_standalone_nodes();
        assert_eq!(g.node_count(), 2);
        assert!(!g.contains_node(&NodeId::from("orphan")));
    }
}
