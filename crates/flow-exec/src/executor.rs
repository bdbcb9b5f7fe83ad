//! The graph executor (spec §4.6, component C6): a bounded worker pool with
//! a barrier after every layer, sequential post-layer propagation on the
//! orchestrator, and router-aware SKIPPED propagation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use flow_core::{
    AdapterRegistry, ExecutionContext, ExecutionControl, ExecutionScope, NodeId,
};
use flow_events::{EventStream, EventType, ExecutionEventBuilder};
use flow_graph::graph::Graph;
use flow_graph::registry::NodeRegistry;
use flow_graph::plan::ExecutionPlan;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{ExecError, Result};
use crate::result::{ChatOutput, ExecutionResult, NodeResult};
use crate::router::{extract_route_decision, ROUTER_LABEL, ROUTE_EDGE_IDS_INPUT_KEY};

const CHAT_OUTPUT_LABEL: &str = "chat_output";
const CHAT_OUTPUT_INPUT: &str = "message_in";

/// Per-run bookkeeping threaded through the layer loop. Not shared across
/// concurrent tasks — only the orchestrator (this struct's owner) touches it,
/// between layer barriers.
struct RunState {
    user_id: String,
    run_id: String,
    task_id: String,
    started_at: Instant,
    results: Vec<NodeResult>,
    /// Edge ids a router explicitly did not select; an edge here makes its
    /// target's incoming connection "dead" for skip-propagation purposes.
    skipped_edges: HashSet<String>,
}

/// The bounded-pool layered executor (spec §4.6.1).
pub struct Executor {
    registry: Arc<NodeRegistry>,
    adapters: Arc<AdapterRegistry>,
    events: EventStream,
    permits: Arc<Semaphore>,
}

impl Executor {
    /// `workers` is the pool width `W` (spec §4.6.1, typical default 4-16).
    pub fn new(registry: Arc<NodeRegistry>, adapters: Arc<AdapterRegistry>, events: EventStream, workers: usize) -> Self {
        Self { registry, adapters, events, permits: Arc::new(Semaphore::new(workers.max(1))) }
    }

    /// Runs `graph` according to `control.scope` (spec §4.6.5).
    pub async fn run(
        &self,
        graph: &mut Graph,
        plan: &ExecutionPlan,
        ctx: &ExecutionContext,
        control: &ExecutionControl,
        task_id: &str,
    ) -> Result<ExecutionResult> {
        let user_id = ctx.user_id.clone().unwrap_or_default();
        let mut state = RunState {
            user_id,
            run_id: ctx.run_id.clone(),
            task_id: task_id.to_string(),
            started_at: Instant::now(),
            results: Vec::new(),
            skipped_edges: HashSet::new(),
        };

        match control.scope {
            ExecutionScope::Full => self.run_full(graph, plan, &mut state).await,
            ExecutionScope::FromNode => {
                let start = control.start_node.clone().ok_or_else(|| ExecError::UnknownStartNode(NodeId::from("")))?;
                self.run_from_node(graph, plan, &mut state, &start).await
            }
            ExecutionScope::NodeOnly => {
                let start = control.start_node.clone().ok_or_else(|| ExecError::UnknownStartNode(NodeId::from("")))?;
                self.run_node_only(graph, &mut state, &start).await
            }
        }
    }

    async fn run_full(&self, graph: &mut Graph, plan: &ExecutionPlan, state: &mut RunState) -> Result<ExecutionResult> {
        self.emit(state, EventType::FlowStarted, None, None, None);
        self.queue_all(state, &plan.layers);

        let outcome = self.run_layers(graph, &plan.layers, state).await;
        self.finish(graph, plan.layers.len(), state, outcome, Vec::new())
    }

    async fn run_node_only(&self, graph: &mut Graph, state: &mut RunState, start: &NodeId) -> Result<ExecutionResult> {
        if !graph.contains_node(start) {
            return Err(ExecError::UnknownStartNode(start.clone()));
        }
        self.emit(state, EventType::FlowStarted, None, None, None);
        let layers = vec![vec![start.clone()]];
        self.queue_all(state, &layers);
        let outcome = self.run_layers(graph, &layers, state).await;
        self.finish(graph, 1, state, outcome, Vec::new())
    }

    async fn run_from_node(
        &self,
        graph: &mut Graph,
        plan: &ExecutionPlan,
        state: &mut RunState,
        start: &NodeId,
    ) -> Result<ExecutionResult> {
        if !graph.contains_node(start) {
            return Err(ExecError::UnknownStartNode(start.clone()));
        }

        let ancestors = stale_ancestors(graph, start);
        let ancestor_layers: Vec<Vec<NodeId>> = plan
            .layers
            .iter()
            .map(|layer| layer.iter().filter(|id| ancestors.contains(*id)).cloned().collect::<Vec<_>>())
            .filter(|layer: &Vec<NodeId>| !layer.is_empty())
            .collect();

        let projected_executed: HashSet<NodeId> = ancestors.iter().cloned().collect();
        let continuing_layers = continue_from(graph, plan, start, &projected_executed);

        self.emit(state, EventType::FlowStarted, None, None, None);
        self.queue_all(state, &ancestor_layers);
        let start_layer = vec![vec![start.clone()]];
        self.queue_all(state, &start_layer);
        self.queue_all(state, &continuing_layers);

        if let Err(err) = self.run_layers(graph, &ancestor_layers, state).await {
            return self.finish(graph, ancestor_layers.len() + continuing_layers.len() + 1, state, Err(err), ancestors.into_iter().collect());
        }

        for ancestor in &ancestors {
            let status = graph.node(ancestor).map(|e| e.data.execution_status);
            if status != Some(flow_core::ExecutionStatus::Completed) {
                let outcome = Err(ExecError::AncestorNotExecuted(ancestor.clone()));
                return self.finish(graph, ancestor_layers.len() + continuing_layers.len() + 1, state, outcome, ancestors.into_iter().collect());
            }
        }

        self.propagate_into(graph, &ancestors, start);

        let remaining: Vec<Vec<NodeId>> = std::iter::once(vec![start.clone()]).chain(continuing_layers.into_iter()).collect();
        let outcome = self.run_layers(graph, &remaining, state).await;
        self.finish(graph, ancestor_layers.len() + remaining.len(), state, outcome, ancestors.into_iter().collect())
    }

    fn queue_all(&self, state: &mut RunState, layers: &[Vec<NodeId>]) {
        for layer in layers {
            for id in layer {
                self.emit(state, EventType::NodeStatusChanged, Some(id), Some("QUEUED"), None);
            }
        }
    }

    /// Runs `layers` in order with a barrier between each (spec §4.6.1-4.6.4).
    /// Stops at the first layer containing a failed node; nodes already
    /// started within that layer still run to completion.
    async fn run_layers(&self, graph: &mut Graph, layers: &[Vec<NodeId>], state: &mut RunState) -> Result<()> {
        for (layer_index, layer) in layers.iter().enumerate() {
            let (to_run, skipped) = self.partition_skip(graph, layer, state);

            for id in &skipped {
                if let Some(entry) = graph.node_mut(id) {
                    entry.data.execution_status = flow_core::ExecutionStatus::Skipped;
                }
                self.emit(state, EventType::NodeStatusChanged, Some(id), Some("SKIPPED"), None);
            }

            let mut join_set: JoinSet<(NodeId, flow_core::NodeData, std::result::Result<(), flow_core::NodeError>)> = JoinSet::new();

            for id in &to_run {
                self.emit(state, EventType::NodeStatusChanged, Some(id), Some("RUNNING"), None);

                let (label, type_name) = {
                    let entry = graph.node(id).expect("node in layer must exist");
                    (entry.label.clone(), entry.type_name.clone())
                };
                let mut data = {
                    let entry = graph.node_mut(id).expect("node in layer must exist");
                    std::mem::take(&mut entry.data)
                };
                if label.as_deref() == Some(ROUTER_LABEL) {
                    let edge_ids: Vec<String> = graph.out_edges(id).iter().map(|e| e.id.clone()).collect();
                    data.input_values.insert(ROUTE_EDGE_IDS_INPUT_KEY.to_string(), serde_json::Value::String(edge_ids.join(",")));
                }

                let registry = self.registry.clone();
                let permits = self.permits.clone();
                let id_owned = id.clone();

                join_set.spawn(async move {
                    let _permit = permits.acquire_owned().await.expect("semaphore never closed");
                    let node = match registry.create(&type_name) {
                        Some(node) => node,
                        None => {
                            return (id_owned, data, Err(flow_core::NodeError::Execution(format!("node type '{type_name}' missing at execution time"))));
                        }
                    };
                    let outcome = node.execute(&mut data);
                    (id_owned, data, outcome)
                });
            }

            let mut failed = Vec::new();
            while let Some(joined) = join_set.join_next().await {
                let (id, mut data, outcome) = joined.expect("node task must not panic");
                let elapsed = state.started_at.elapsed().as_secs_f64();

                match &outcome {
                    Ok(()) => {
                        data.execution_status = flow_core::ExecutionStatus::Completed;
                        let payload = serde_json::to_value(&data.output_values).unwrap_or(serde_json::Value::Null);
                        self.emit(state, EventType::NodeStatusChanged, Some(&id), Some("COMPLETED"), Some(payload.clone()));
                        state.results.push(NodeResult { node_id: id.clone(), success: true, data: Some(payload), error: None, execution_time_seconds: elapsed });
                    }
                    Err(err) => {
                        data.execution_status = flow_core::ExecutionStatus::Failed;
                        self.emit(state, EventType::NodeStatusChanged, Some(&id), Some("FAILED"), Some(serde_json::json!({ "error": err.to_string() })));
                        state.results.push(NodeResult { node_id: id.clone(), success: false, data: None, error: Some(err.to_string()), execution_time_seconds: elapsed });
                        failed.push(id.clone());
                    }
                }

                if let Some(entry) = graph.node_mut(&id) {
                    entry.data = data;
                }
            }

            if !failed.is_empty() {
                return Err(ExecError::LayerFailed { layer_index, failed_nodes: failed });
            }

            self.propagate_layer(graph, state, &to_run);
        }

        Ok(())
    }

    /// Pre-execution skip check (spec §4.6.2): a node is SKIPPED if it was
    /// already marked so, or if it has at least one incoming edge and every
    /// incoming edge is "dead" (source skipped, or a router explicitly
    /// deselected that edge).
    fn partition_skip(&self, graph: &Graph, layer: &[NodeId], state: &RunState) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut to_run = Vec::new();
        let mut skipped = Vec::new();

        for id in layer {
            let entry = graph.node(id).expect("node in layer must exist");
            let already_skipped = entry.data.execution_status == flow_core::ExecutionStatus::Skipped;
            let incoming = graph.in_edges(id);

            let all_dead = !incoming.is_empty()
                && incoming.iter().all(|edge| {
                    state.skipped_edges.contains(&edge.id)
                        || graph
                            .node(&edge.source)
                            .map(|source| source.data.execution_status == flow_core::ExecutionStatus::Skipped)
                            .unwrap_or(false)
                });

            if already_skipped || all_dead {
                skipped.push(id.clone());
            } else {
                to_run.push(id.clone());
            }
        }

        (to_run, skipped)
    }

    /// Post-layer propagation (spec §4.6.4): runs sequentially on the
    /// orchestrator once every task in the layer has returned.
    fn propagate_layer(&self, graph: &mut Graph, state: &mut RunState, completed: &[NodeId]) {
        for u in completed {
            let is_router = graph.node(u).map(|e| e.label.as_deref() == Some(ROUTER_LABEL)).unwrap_or(false);
            let route_decision = if is_router { graph.node(u).and_then(extract_route_decision) } else { None };

            let edges = graph.out_edges(u).to_vec();
            for edge in edges {
                if let Some(decision) = &route_decision {
                    if decision.selected_edge_ids.contains(&edge.id) {
                        self.propagate_value(graph, u, &edge, Some(decision.route_value.clone()));
                    } else {
                        state.skipped_edges.insert(edge.id.clone());
                    }
                } else {
                    self.propagate_value(graph, u, &edge, None);
                }
            }
        }
    }

    fn propagate_value(&self, graph: &mut Graph, u: &NodeId, edge: &flow_graph::graph::Edge, override_value: Option<serde_json::Value>) {
        let (source_kind, raw_value) = {
            let source = match graph.node(u) {
                Some(s) => s,
                None => return,
            };
            let kind = match source.spec.output(&edge.source_handle) {
                Some(o) => o.handle,
                None => return,
            };
            let value = override_value.unwrap_or_else(|| source.data.output_values.get(&edge.source_handle).cloned().unwrap_or(serde_json::Value::Null));
            (kind, value)
        };

        let target_kind = match graph.node(&edge.target).and_then(|t| t.spec.input(&edge.target_handle)) {
            Some(input) => input.handle.kind,
            None => return,
        };

        let adapted = self.adapters.adapt(source_kind, target_kind, &raw_value);

        if let Some(target) = graph.node_mut(&edge.target) {
            target.data.input_values.insert(edge.target_handle.clone(), adapted);
        }
    }

    /// FROM_NODE step: propagates every stale ancestor's outputs into
    /// `start`'s inputs (spec §4.6.5), reusing the normal adapter path.
    fn propagate_into(&self, graph: &mut Graph, ancestors: &[NodeId], start: &NodeId) {
        let ancestor_set: HashSet<NodeId> = ancestors.iter().cloned().collect();
        let edges: Vec<flow_graph::graph::Edge> = graph
            .in_edges(start)
            .iter()
            .filter(|e| ancestor_set.contains(&e.source))
            .cloned()
            .collect();
        for edge in edges {
            let source = edge.source.clone();
            self.propagate_value(graph, &source, &edge, None);
        }
    }

    fn emit(&self, state: &RunState, event_type: EventType, node_id: Option<&NodeId>, status: Option<&str>, data: Option<serde_json::Value>) {
        let mut builder = ExecutionEventBuilder::new(event_type, &state.user_id, &state.run_id, &state.task_id);
        if let Some(id) = node_id {
            builder = builder.with_node(id.to_string());
        }
        if let Some(status) = status {
            builder = builder.with_status(status);
        }
        if let Some(data) = data {
            builder = builder.with_data(data);
        }
        self.events.publish(&state.user_id, builder.build());
    }

    fn finish(
        &self,
        graph: &Graph,
        total_layers: usize,
        state: &mut RunState,
        outcome: std::result::Result<(), ExecError>,
        ancestors: Vec<NodeId>,
    ) -> Result<ExecutionResult> {
        let execution_time_seconds = state.started_at.elapsed().as_secs_f64();
        let completed_nodes = state.results.iter().filter(|r| r.success).count();
        let total_nodes = graph.node_count();

        match outcome {
            Ok(()) => {
                let chat_output = find_chat_output(graph);
                self.emit(
                    state,
                    EventType::FlowEnded,
                    None,
                    None,
                    Some(serde_json::json!({
                        "total_nodes": total_nodes,
                        "completed_nodes": completed_nodes,
                        "total_layers": total_layers,
                        "execution_time_seconds": execution_time_seconds,
                    })),
                );
                Ok(ExecutionResult {
                    success: true,
                    total_nodes,
                    completed_nodes,
                    total_layers,
                    execution_time_seconds,
                    results: state.results.clone(),
                    chat_output,
                    ancestors,
                })
            }
            Err(err) => {
                let (layer_index, failed_nodes) = match &err {
                    ExecError::LayerFailed { layer_index, failed_nodes } => (*layer_index, failed_nodes.clone()),
                    ExecError::AncestorNotExecuted(id) => (0, vec![id.clone()]),
                    _ => (0, Vec::new()),
                };
                self.emit(
                    state,
                    EventType::FlowFailed,
                    None,
                    None,
                    Some(serde_json::json!({ "layer_index": layer_index, "failed_nodes": failed_nodes.iter().map(|n| n.to_string()).collect::<Vec<_>>() })),
                );
                Err(err)
            }
        }
    }
}

fn find_chat_output(graph: &Graph) -> Option<ChatOutput> {
    for id in graph.node_ids() {
        let Some(entry) = graph.node(id) else { continue };
        if entry.label.as_deref() == Some(CHAT_OUTPUT_LABEL) {
            let content = entry.data.input_values.get(CHAT_OUTPUT_INPUT).cloned().unwrap_or(serde_json::Value::Null);
            return Some(ChatOutput { content });
        }
    }
    None
}

/// BFS over predecessors, keeping only ancestors that lack a valid completed
/// output (spec §4.6.5 "FROM_NODE").
fn stale_ancestors(graph: &Graph, start: &NodeId) -> Vec<NodeId> {
    let mut visited = HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(start.clone());
    visited.insert(start.clone());

    let mut stale = Vec::new();
    while let Some(id) = queue.pop_front() {
        for pred in graph.predecessors(&id) {
            if visited.insert(pred.clone()) {
                let is_completed = graph.node(pred).map(|e| e.data.execution_status == flow_core::ExecutionStatus::Completed).unwrap_or(false);
                if !is_completed {
                    stale.push(pred.clone());
                }
                queue.push_back(pred.clone());
            }
        }
    }
    stale
}

/// Builds the continuing-layer slice for FROM_NODE: from `start`'s layer
/// onward, keeping only nodes whose predecessors are all already executed
/// (spec §4.6.5).
fn continue_from(graph: &Graph, plan: &ExecutionPlan, start: &NodeId, already_executed: &HashSet<NodeId>) -> Vec<Vec<NodeId>> {
    let start_layer = match plan.layer_of(start) {
        Some(idx) => idx,
        None => return Vec::new(),
    };

    let mut executed = already_executed.clone();
    executed.insert(start.clone());
    let mut layers = Vec::new();

    for layer in &plan.layers[start_layer + 1..] {
        let filtered: Vec<NodeId> = layer.iter().filter(|id| graph.predecessors(id).all(|p| executed.contains(p))).cloned().collect();
        if filtered.is_empty() {
            continue;
        }
        for id in &filtered {
            executed.insert(id.clone());
        }
        layers.push(filtered);
    }

    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::{HandleKind, HandleSpec, Node, NodeData, NodeInput, NodeOutput, NodeSpec};
    use flow_graph::compiler::compile;
    use flow_graph::graph::Edge;
    use std::collections::HashMap as Map;

    struct ChatInputNode(NodeSpec);
    impl Node for ChatInputNode {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, _: &Map<String, serde_json::Value>, _: &Map<String, serde_json::Value>) -> flow_core::Result<serde_json::Value> {
            Ok(serde_json::Value::String("hi".into()))
        }
    }

    struct IdentityNode(NodeSpec);
    impl Node for IdentityNode {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, inputs: &Map<String, serde_json::Value>, _: &Map<String, serde_json::Value>) -> flow_core::Result<serde_json::Value> {
            Ok(inputs.get("in").cloned().unwrap_or(serde_json::Value::Null))
        }
    }

    struct ChatOutputNode(NodeSpec);
    impl Node for ChatOutputNode {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, _: &Map<String, serde_json::Value>, _: &Map<String, serde_json::Value>) -> flow_core::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    struct RouterNode(NodeSpec);
    impl Node for RouterNode {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, inputs: &Map<String, serde_json::Value>, _: &Map<String, serde_json::Value>) -> flow_core::Result<serde_json::Value> {
            let edge_ids = inputs
                .get(ROUTE_EDGE_IDS_INPUT_KEY)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .split(',')
                .next()
                .unwrap_or_default()
                .to_string();
            Ok(serde_json::json!({ "route_value": "x", "route_label_decisions": [edge_ids] }))
        }
    }

    struct JoinNode(NodeSpec);
    impl Node for JoinNode {
        fn spec(&self) -> &NodeSpec {
            &self.0
        }
        fn process(&self, inputs: &Map<String, serde_json::Value>, _: &Map<String, serde_json::Value>) -> flow_core::Result<serde_json::Value> {
            Ok(serde_json::json!({ "joined": inputs.len() }))
        }
    }

    fn text_input(name: &str, required: bool) -> NodeInput {
        NodeInput { name: name.into(), handle: HandleSpec::new(HandleKind::Text), description: String::new(), default: None, required }
    }

    fn text_output(name: &str) -> NodeOutput {
        NodeOutput { name: name.into(), handle: HandleKind::Text, description: String::new() }
    }

    fn test_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register("chat_input", Box::new(|| {
            Box::new(ChatInputNode(NodeSpec::new("chat_input", "", vec![], vec![text_output("message")], vec![]).unwrap()))
        }));
        registry.register("identity", Box::new(|| {
            Box::new(IdentityNode(NodeSpec::new("identity", "", vec![text_input("in", true)], vec![text_output("out")], vec![]).unwrap()))
        }));
        registry.register("chat_output", Box::new(|| {
            Box::new(ChatOutputNode(NodeSpec::new("chat_output", "", vec![text_input("message_in", true)], vec![text_output("ack")], vec![]).unwrap()))
        }));
        registry.register("router", Box::new(|| {
            let output = NodeOutput { name: "route".into(), handle: HandleKind::RouterOutput, description: String::new() };
            Box::new(RouterNode(NodeSpec::new("router", "", vec![], vec![output], vec![]).unwrap()))
        }));
        registry.register("join3", Box::new(|| {
            let inputs = vec![text_input("a", false), text_input("b", false), text_input("c", false)];
            let output = NodeOutput { name: "joined".into(), handle: HandleKind::Number, description: String::new() };
            Box::new(JoinNode(NodeSpec::new("join3", "", inputs, vec![output], vec![]).unwrap()))
        }));
        registry
    }

    fn edge(id: &str, source: &str, target: &str, source_handle: &str, target_handle: &str) -> Edge {
        Edge { id: id.into(), source: NodeId::from(source), target: NodeId::from(target), source_handle: source_handle.into(), target_handle: target_handle.into() }
    }

    fn add(graph: &mut Graph, registry: &NodeRegistry, id: &str, type_name: &str, label: Option<&str>) {
        let node = registry.create(type_name).unwrap();
        graph.add_node(NodeId::from(id), node.spec().clone(), NodeData::new(), type_name, label.map(String::from));
    }

    fn test_executor(registry: Arc<NodeRegistry>, workers: usize) -> Executor {
        Executor::new(registry, Arc::new(AdapterRegistry::new()), EventStream::new(), workers)
    }

    #[tokio::test]
    async fn s1_linear_chain_full_run() {
        let registry = Arc::new(test_registry());
        let mut graph = Graph::new();
        add(&mut graph, &registry, "A", "chat_input", Some("chat_input"));
        add(&mut graph, &registry, "B", "identity", None);
        add(&mut graph, &registry, "C", "chat_output", Some("chat_output"));
        graph.add_edge(edge("e1", "A", "B", "message", "in"));
        graph.add_edge(edge("e2", "B", "C", "out", "message_in"));

        let plan = compile(&mut graph, false).unwrap();
        assert_eq!(plan.layers.len(), 3);

        let executor = test_executor(registry, 4);
        let ctx = ExecutionContext::new("run-1", "flow-1").with_user_id("u1");
        let result = executor.run(&mut graph, &plan, &ctx, &ExecutionControl::full(), "task-1").await.unwrap();

        assert!(result.success);
        assert_eq!(result.completed_nodes, 3);
        assert_eq!(result.chat_output.unwrap().content, serde_json::Value::String("hi".into()));
    }

    #[tokio::test]
    async fn s2_fan_out_fan_in_joins_three_branches() {
        let registry = Arc::new(test_registry());
        let mut graph = Graph::new();
        add(&mut graph, &registry, "A", "chat_input", Some("chat_input"));
        add(&mut graph, &registry, "B1", "identity", None);
        add(&mut graph, &registry, "B2", "identity", None);
        add(&mut graph, &registry, "B3", "identity", None);
        add(&mut graph, &registry, "C", "join3", None);
        graph.add_edge(edge("e1", "A", "B1", "message", "in"));
        graph.add_edge(edge("e2", "A", "B2", "message", "in"));
        graph.add_edge(edge("e3", "A", "B3", "message", "in"));
        graph.add_edge(edge("e4", "B1", "C", "out", "a"));
        graph.add_edge(edge("e5", "B2", "C", "out", "b"));
        graph.add_edge(edge("e6", "B3", "C", "out", "c"));

        let plan = compile(&mut graph, false).unwrap();
        assert_eq!(plan.layers[1].len(), 3);

        let executor = test_executor(registry, 2);
        let ctx = ExecutionContext::new("run-2", "flow-1").with_user_id("u1");
        let result = executor.run(&mut graph, &plan, &ctx, &ExecutionControl::full(), "task-2").await.unwrap();

        assert!(result.success);
        assert_eq!(result.completed_nodes, 5);
        assert_eq!(graph.node(&NodeId::from("C")).unwrap().data.output_values["joined"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn s3_router_skips_unselected_branch() {
        let registry = Arc::new(test_registry());
        let mut graph = Graph::new();
        add(&mut graph, &registry, "A", "router", Some("router"));
        add(&mut graph, &registry, "X", "identity", None);
        add(&mut graph, &registry, "Y", "identity", None);
        graph.add_edge(edge("E1", "A", "X", "route", "in"));
        graph.add_edge(edge("E2", "A", "Y", "route", "in"));

        let plan = compile(&mut graph, false).unwrap();
        let executor = test_executor(registry, 4);
        let ctx = ExecutionContext::new("run-3", "flow-1").with_user_id("u1");
        let result = executor.run(&mut graph, &plan, &ctx, &ExecutionControl::full(), "task-3").await.unwrap();

        assert!(result.success);
        assert_eq!(graph.node(&NodeId::from("X")).unwrap().data.execution_status, flow_core::ExecutionStatus::Completed);
        assert_eq!(graph.node(&NodeId::from("Y")).unwrap().data.execution_status, flow_core::ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn s4_from_node_runs_stale_ancestor_first() {
        let registry = Arc::new(test_registry());
        let mut graph = Graph::new();
        add(&mut graph, &registry, "A", "chat_input", Some("chat_input"));
        add(&mut graph, &registry, "B", "identity", None);
        add(&mut graph, &registry, "C", "chat_output", Some("chat_output"));
        graph.add_edge(edge("e1", "A", "B", "message", "in"));
        graph.add_edge(edge("e2", "B", "C", "out", "message_in"));

        let plan = compile(&mut graph, false).unwrap();
        let executor = test_executor(registry, 4);
        let ctx = ExecutionContext::new("run-4", "flow-1").with_user_id("u1");
        let control = ExecutionControl::from_node(NodeId::from("B"));
        let result = executor.run(&mut graph, &plan, &ctx, &control, "task-4").await.unwrap();

        assert!(result.success);
        assert_eq!(graph.node(&NodeId::from("A")).unwrap().data.execution_status, flow_core::ExecutionStatus::Completed);
        assert_eq!(graph.node(&NodeId::from("B")).unwrap().data.execution_status, flow_core::ExecutionStatus::Completed);
        assert_eq!(graph.node(&NodeId::from("C")).unwrap().data.execution_status, flow_core::ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn node_only_runs_exactly_the_target_node() {
        let registry = Arc::new(test_registry());
        let mut graph = Graph::new();
        add(&mut graph, &registry, "A", "chat_input", Some("chat_input"));
        add(&mut graph, &registry, "B", "identity", None);
        graph.add_edge(edge("e1", "A", "B", "message", "in"));
        if let Some(entry) = graph.node_mut(&NodeId::from("B")) {
            entry.data.input_values.insert("in".into(), serde_json::Value::String("preset".into()));
        }

        let plan = compile(&mut graph, false).unwrap();
        let executor = test_executor(registry, 4);
        let ctx = ExecutionContext::new("run-5", "flow-1").with_user_id("u1");
        let control = ExecutionControl::node_only(NodeId::from("B"));
        let result = executor.run(&mut graph, &plan, &ctx, &control, "task-5").await.unwrap();

        assert!(result.success);
        assert_eq!(graph.node(&NodeId::from("A")).unwrap().data.execution_status, flow_core::ExecutionStatus::Pending);
        assert_eq!(graph.node(&NodeId::from("B")).unwrap().data.execution_status, flow_core::ExecutionStatus::Completed);
    }
}
