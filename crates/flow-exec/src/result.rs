//! Aggregate execution result (spec §6 "Execution result (final)").

use flow_core::NodeId;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct NodeResult {
    pub node_id: NodeId,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub execution_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutput {
    pub content: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub total_nodes: usize,
    pub completed_nodes: usize,
    pub total_layers: usize,
    pub execution_time_seconds: f64,
    pub results: Vec<NodeResult>,
    pub chat_output: Option<ChatOutput>,
    pub ancestors: Vec<NodeId>,
}
