//! The layered execution plan produced by the compiler (spec §3 "Execution
//! plan", §4.4).

use std::collections::HashSet;

use flow_core::NodeId;

use crate::error::{GraphError, Result};
use crate::graph::Graph;

/// An ordered sequence of layers; every node appears in exactly one layer,
/// and an edge `u -> v` always has `layer(u) < layer(v)`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub layers: Vec<Vec<NodeId>>,
}

/// Aggregate shape stats surfaced by the compiler (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub layer_count: usize,
    pub max_layer_width: usize,
    pub min_layer_width: usize,
    pub avg_layer_width: f64,
}

impl ExecutionPlan {
    pub fn layer_of(&self, id: &NodeId) -> Option<usize> {
        self.layers.iter().position(|layer| layer.contains(id))
    }

    /// Validates the structural invariants of spec §4.4 step 5: no empty
    /// layers, no duplicate node across layers, plan membership equals the
    /// graph's node set, and every edge respects layer ordering.
    pub fn validate(&self, graph: &Graph) -> Result<()> {
        if self.layers.iter().any(|layer| layer.is_empty()) {
            return Err(GraphError::UnprocessedNodes(Vec::new()));
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            for id in layer {
                if !seen.insert(id.clone()) {
                    return Err(GraphError::InvalidEdge {
                        edge_id: String::new(),
                        reason: format!("node {id} appears in more than one layer"),
                    });
                }
            }
        }

        let graph_nodes: HashSet<NodeId> = graph.node_ids().cloned().collect();
        if seen != graph_nodes {
            let missing: Vec<NodeId> = graph_nodes.difference(&seen).cloned().collect();
            return Err(GraphError::UnprocessedNodes(missing));
        }

        for id in graph.node_ids() {
            let layer_u = self.layer_of(id).expect("membership checked above");
            for edge in graph.out_edges(id) {
                let layer_v = self.layer_of(&edge.target).expect("membership checked above");
                if layer_u >= layer_v {
                    return Err(GraphError::InvalidEdge {
                        edge_id: edge.id.clone(),
                        reason: format!("edge target layer {layer_v} does not exceed source layer {layer_u}"),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn stats(&self, graph: &Graph) -> PlanStats {
        let widths: Vec<usize> = self.layers.iter().map(|l| l.len()).collect();
        let total_nodes = graph.node_count();
        let layer_count = widths.len();
        let max_layer_width = widths.iter().copied().max().unwrap_or(0);
        let min_layer_width = widths.iter().copied().min().unwrap_or(0);
        let avg_layer_width = if layer_count == 0 { 0.0 } else { total_nodes as f64 / layer_count as f64 };

        PlanStats {
            total_nodes,
            total_edges: graph.edge_count(),
            layer_count,
            max_layer_width,
            min_layer_width,
            avg_layer_width,
        }
    }
}
