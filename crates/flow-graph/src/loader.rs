//! Graph loader (spec §4.3, component C3): turns a raw request bundle into
//! the in-memory [`Graph`], instantiating nodes via the [`NodeRegistry`] and
//! validating every edge against the handle/adapter registry (C2).

use std::collections::HashMap;

use flow_core::{strip_index_suffix, AdapterRegistry, NodeData, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::graph::{Edge, Graph};
use crate::registry::NodeRegistry;

/// One node in a load request: which concrete node type to instantiate, and
/// the per-run data to attach to it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeRec {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub input_values: HashMap<String, Value>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// Node-type label used by the executor to recognize special handling
    /// (e.g. `"router"`, `"chat_input"`, `"chat_output"`).
    #[serde(default)]
    pub label: Option<String>,
}

/// One edge in a load request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeRec {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
}

/// The full raw bundle handed to the loader (spec §6 "Node registry input").
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GraphRequest {
    pub nodes: Vec<NodeRec>,
    pub edges: Vec<EdgeRec>,
    /// Overrides a chat-input node's emitted text for API-driven runs.
    #[serde(default)]
    pub chat_input_override: Option<String>,
}

/// Loads `request` into a [`Graph`], instantiating node types via `registry`
/// and validating handle compatibility via `adapters` (spec §4.3).
pub fn load(registry: &NodeRegistry, adapters: &AdapterRegistry, request: GraphRequest) -> Result<Graph> {
    let mut graph = Graph::new();

    for rec in &request.nodes {
        let node = registry
            .create(&rec.type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(rec.type_name.clone()))?;

        let mut data = NodeData::new();
        data.input_values = rec.input_values.clone();
        data.parameters = rec.parameters.clone();

        graph.add_node(NodeId::from(rec.id.as_str()), node.spec().clone(), data, rec.type_name.clone(), rec.label.clone());
    }

    if let Some(override_text) = &request.chat_input_override {
        apply_chat_input_override(&mut graph, override_text);
    }

    for rec in &request.edges {
        let edge = build_edge(&graph, adapters, rec)?;
        graph.add_edge(edge);
    }

    Ok(graph)
}

fn apply_chat_input_override(graph: &mut Graph, override_text: &str) {
    for id in graph.node_ids().cloned().collect::<Vec<_>>() {
        let is_chat_input = graph
            .node(&id)
            .map(|entry| entry.label.as_deref() == Some("chat_input"))
            .unwrap_or(false);
        if !is_chat_input {
            continue;
        }
        if let Some(entry) = graph.node_mut(&id) {
            entry
                .data
                .output_values
                .insert("message".into(), Value::String(override_text.to_string()));
        }
    }
}

fn build_edge(graph: &Graph, adapters: &AdapterRegistry, rec: &EdgeRec) -> Result<Edge> {
    let source_id = NodeId::from(rec.source.as_str());
    let target_id = NodeId::from(rec.target.as_str());

    let source_handle = strip_index_suffix(&rec.source_handle);
    let target_handle = strip_index_suffix(&rec.target_handle);

    let source_entry = graph.node(&source_id).ok_or_else(|| GraphError::InvalidEdge {
        edge_id: rec.id.clone(),
        reason: format!("unknown source node {}", rec.source),
    })?;
    let target_entry = graph.node(&target_id).ok_or_else(|| GraphError::InvalidEdge {
        edge_id: rec.id.clone(),
        reason: format!("unknown target node {}", rec.target),
    })?;

    let source_output = source_entry.spec.output(source_handle).ok_or_else(|| GraphError::InvalidEdge {
        edge_id: rec.id.clone(),
        reason: format!("source handle '{source_handle}' not declared on node {}", rec.source),
    })?;
    let target_input = target_entry.spec.input(target_handle).ok_or_else(|| GraphError::InvalidEdge {
        edge_id: rec.id.clone(),
        reason: format!("target handle '{target_handle}' not declared on node {}", rec.target),
    })?;

    if !target_input.handle.allow_incoming_edges {
        return Err(GraphError::InvalidEdge {
            edge_id: rec.id.clone(),
            reason: format!("target handle '{target_handle}' does not accept incoming edges"),
        });
    }

    let existing_incoming = graph
        .in_edges(&target_id)
        .iter()
        .filter(|e| e.target_handle == target_handle)
        .count();
    if existing_incoming >= 1 && !target_input.handle.allow_multiple_incoming_edges {
        return Err(GraphError::InvalidEdge {
            edge_id: rec.id.clone(),
            reason: format!("target handle '{target_handle}' already has an incoming edge"),
        });
    }

    if !adapters.compatible(source_output.handle, target_input.handle.kind) {
        return Err(GraphError::InvalidEdge {
            edge_id: rec.id.clone(),
            reason: format!(
                "incompatible handles: {source_handle} ({:?}) -> {target_handle} ({:?})",
                source_output.handle, target_input.handle.kind
            ),
        });
    }

    Ok(Edge {
        id: rec.id.clone(),
        source: source_id,
        target: target_id,
        source_handle: source_handle.to_string(),
        target_handle: target_handle.to_string(),
    })
}
