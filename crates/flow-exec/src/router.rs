//! Router node output parsing (spec §4.6.4 "Router semantics").

use flow_core::HandleKind;
use flow_graph::graph::NodeEntry;
use serde_json::Value;

/// A router node's decision: the value to propagate on selected branches and
/// the set of outgoing edge ids that were selected.
pub struct RouteDecision {
    pub route_value: Value,
    pub selected_edge_ids: Vec<String>,
}

/// Extracts the routing decision from a router node's packaged outputs. The
/// router's single declared output (kind `RouterOutput`) holds the record
/// `{route_value, route_label_decisions}` produced by `process`.
pub fn extract_route_decision(entry: &NodeEntry) -> Option<RouteDecision> {
    let output_name = entry.spec.outputs.iter().find(|o| o.handle == HandleKind::RouterOutput)?.name.clone();
    let value = entry.data.output_values.get(&output_name)?;

    let route_value = value.get("route_value").cloned().unwrap_or(Value::Null);
    let selected_edge_ids = value
        .get("route_label_decisions")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    Some(RouteDecision { route_value, selected_edge_ids })
}

/// The reserved input key under which the executor injects the comma-joined
/// list of a router node's outgoing edge ids (spec §4.6.2).
pub const ROUTE_EDGE_IDS_INPUT_KEY: &str = "__route_edge_ids";

pub const ROUTER_LABEL: &str = "router";
