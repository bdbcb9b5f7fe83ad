//! Layered topological sort (spec §4.4, component C4): Kahn's algorithm,
//! grouping each wave of zero-remaining-indegree nodes into one layer.

use std::collections::{HashMap, VecDeque};

use flow_core::NodeId;

use crate::error::{GraphError, Result};
use crate::graph::Graph;
use crate::plan::ExecutionPlan;

/// Compiles `graph` into a layered [`ExecutionPlan`] (spec §4.4 steps 1-5).
///
/// When `remove_standalone` is set, nodes with no incident edges are dropped
/// before layering — used by the "compile only" preview path.
pub fn compile(graph: &mut Graph, remove_standalone: bool) -> Result<ExecutionPlan> {
    if remove_standalone {
        graph.remove_standalone_nodes();
    }

    if graph.is_empty() {
        return Err(GraphError::EmptyGraph);
    }

    if has_cycle(graph) {
        return Err(GraphError::NotADag);
    }

    let mut in_degree: HashMap<NodeId, usize> =
        graph.node_ids().map(|id| (id.clone(), graph.in_degree(id))).collect();

    let mut frontier: VecDeque<NodeId> =
        graph.node_ids().filter(|id| in_degree[id] == 0).cloned().collect();

    let mut layers = Vec::new();
    let mut processed = 0usize;

    while !frontier.is_empty() {
        let layer: Vec<NodeId> = frontier.drain(..).collect();
        processed += layer.len();

        let mut next_frontier = Vec::new();
        for id in &layer {
            for successor in graph.successors(id) {
                let degree = in_degree.get_mut(successor).expect("successor must be in graph");
                *degree -= 1;
                if *degree == 0 {
                    next_frontier.push(successor.clone());
                }
            }
        }

        layers.push(layer);
        frontier.extend(next_frontier);
    }

    if processed != graph.node_count() {
        let unprocessed: Vec<NodeId> = graph
            .node_ids()
            .filter(|id| in_degree.get(*id).copied().unwrap_or(0) != 0)
            .cloned()
            .collect();
        return Err(GraphError::UnprocessedNodes(unprocessed));
    }

    let plan = ExecutionPlan { layers };
    plan.validate(graph)?;
    Ok(plan)
}

/// Three-color DFS cycle check (spec §7 `NOT_A_DAG`), run before the Kahn
/// pass so a cycle is reported distinctly from `UnprocessedNodes`.
fn has_cycle(graph: &Graph) -> bool {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    fn visit(id: &NodeId, graph: &Graph, color: &mut HashMap<NodeId, Color>) -> bool {
        color.insert(id.clone(), Color::Gray);
        for successor in graph.successors(id) {
            match color.get(successor).copied().unwrap_or(Color::White) {
                Color::Gray => return true,
                Color::Black => continue,
                Color::White => {
                    if visit(successor, graph, color) {
                        return true;
                    }
                }
            }
        }
        color.insert(id.clone(), Color::Black);
        false
    }

    let mut color: HashMap<NodeId, Color> = graph.node_ids().map(|id| (id.clone(), Color::White)).collect();
    graph
        .node_ids()
        .cloned()
        .collect::<Vec<_>>()
        .iter()
        .any(|id| color.get(id).copied().unwrap_or(Color::White) == Color::White && visit(id, graph, &mut color))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use flow_core::NodeData;
    use flow_core::NodeSpec;

    fn spec() -> NodeSpec {
        NodeSpec::new("t", "t", vec![], vec![], vec![]).unwrap()
    }

    fn edge(id: &str, source: &str, target: &str) -> Edge {
        Edge {
            id: id.into(),
            source: NodeId::from(source),
            target: NodeId::from(target),
            source_handle: "out".into(),
            target_handle: "in".into(),
        }
    }

    #[test]
    fn empty_graph_is_rejected() {
        let mut g = Graph::new();
        assert!(matches!(compile(&mut g, false), Err(GraphError::EmptyGraph)));
    }

    #[test]
    fn linear_chain_yields_one_node_per_layer() {
        let mut g = Graph::new();
        for id in ["a", "b", "c"] {
            g.add_node(NodeId::from(id), spec(), NodeData::new(), "t", None);
        }
        g.add_edge(edge("e1", "a", "b"));
        g.add_edge(edge("e2", "b", "c"));

        let plan = compile(&mut g, false).unwrap();
        assert_eq!(plan.layers, vec![vec![NodeId::from("a")], vec![NodeId::from("b")], vec![NodeId::from("c")]]);
    }

    #[test]
    fn fan_out_fan_in_groups_independent_nodes_into_one_layer() {
        let mut g = Graph::new();
        for id in ["a", "b1", "b2", "b3", "c"] {
            g.add_node(NodeId::from(id), spec(), NodeData::new(), "t", None);
        }
        g.add_edge(edge("e1", "a", "b1"));
        g.add_edge(edge("e2", "a", "b2"));
        g.add_edge(edge("e3", "a", "b3"));
        g.add_edge(edge("e4", "b1", "c"));
        g.add_edge(edge("e5", "b2", "c"));
        g.add_edge(edge("e6", "b3", "c"));

        let plan = compile(&mut g, false).unwrap();
        assert_eq!(plan.layers.len(), 3);
        assert_eq!(plan.layers[1].len(), 3);
    }

    #[test]
    fn cycle_is_rejected_as_not_a_dag() {
        let mut g = Graph::new();
        for id in ["a", "b"] {
            g.add_node(NodeId::from(id), spec(), NodeData::new(), "t", None);
        }
        g.add_edge(edge("e1", "a", "b"));
        g.add_edge(edge("e2", "b", "a"));

        assert!(matches!(compile(&mut g, false), Err(GraphError::NotADag)));
    }

    #[test]
    fn longer_cycle_through_an_otherwise_acyclic_branch_is_rejected() {
        let mut g = Graph::new();
        for id in ["a", "b", "c", "d"] {
            g.add_node(NodeId::from(id), spec(), NodeData::new(), "t", None);
        }
        g.add_edge(edge("e1", "a", "b"));
        g.add_edge(edge("e2", "b", "c"));
        g.add_edge(edge("e3", "c", "d"));
        g.add_edge(edge("e4", "d", "b"));

        assert!(matches!(compile(&mut g, false), Err(GraphError::NotADag)));
    }

    #[test]
    fn remove_standalone_drops_orphans_before_layering() {
        let mut g = Graph::new();
        g.add_node(NodeId::from("a"), spec(), NodeData::new(), "t", None);
        g.add_node(NodeId::from("b"), spec(), NodeData::new(), "t", None);
        g.add_edge(edge("e1", "a", "b"));
        g.add_node(NodeId::from("orphan"), spec(), NodeData::new(), "t", None);

        let plan = compile(&mut g, true).unwrap();
        assert_eq!(g.node_count(), 2);
        assert_eq!(plan.layers.iter().map(|l| l.len()).sum::<usize>(), 2);
    }

    #[test]
    fn recompiling_the_same_graph_yields_the_same_plan() {
        let mut g = Graph::new();
        for id in ["a", "b1", "b2", "c"] {
            g.add_node(NodeId::from(id), spec(), NodeData::new(), "t", None);
        }
        g.add_edge(edge("e1", "a", "b1"));
        g.add_edge(edge("e2", "a", "b2"));
        g.add_edge(edge("e3", "b1", "c"));
        g.add_edge(edge("e4", "b2", "c"));

        let first = compile(&mut g, false).unwrap();
        let second = compile(&mut g, false).unwrap();

        let normalize = |plan: &ExecutionPlan| -> Vec<std::collections::BTreeSet<NodeId>> {
            plan.layers.iter().map(|l| l.iter().cloned().collect()).collect()
        };
        assert_eq!(normalize(&first), normalize(&second));
    }

    proptest::proptest! {
        /// Any acyclic chain of forward-only edges compiles to a plan whose
        /// layers respect `layer(u) < layer(v)` for every edge (invariant 1).
        #[test]
        fn forward_edges_always_respect_layer_ordering(edge_pairs in proptest::collection::vec((0usize..8, 0usize..8), 0..16)) {
            let mut g = Graph::new();
            for i in 0..8 {
                g.add_node(NodeId::from(i.to_string().as_str()), spec(), NodeData::new(), "t", None);
            }
            let mut next_id = 0;
            for (a, b) in edge_pairs {
                if a < b {
                    next_id += 1;
                    g.add_edge(edge(&format!("e{next_id}"), &a.to_string(), &b.to_string()));
                }
            }
            let plan = compile(&mut g, false).unwrap();
            plan.validate(&g).unwrap();
        }
    }
}
