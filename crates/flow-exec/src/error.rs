use flow_core::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("graph error: {0}")]
    Graph(#[from] flow_graph::GraphError),

    #[error("node {node_id} failed: {source}")]
    NodeExecution { node_id: NodeId, #[source] source: flow_core::NodeError },

    #[error("node type '{type_name}' not found in the registry at execution time")]
    NodeTypeMissing { type_name: String },

    /// FROM_NODE strategy: an ancestor of `start_node` still lacks a valid
    /// completed output after its mini-plan ran (spec §7).
    #[error("ancestor {0} of start node was not successfully executed")]
    AncestorNotExecuted(NodeId),

    #[error("start node {0} not found in graph")]
    UnknownStartNode(NodeId),

    #[error("layer {layer_index} failed: {failed_nodes:?}")]
    LayerFailed { layer_index: usize, failed_nodes: Vec<NodeId> },

    /// The runner's hard wall-clock limit elapsed before the run finished
    /// (spec §7 `TIMEOUT_HARD`); the soft limit already gave it a grace
    /// period to finish gracefully.
    #[error("run exceeded its hard wall-clock limit")]
    TimedOut,
}

pub type Result<T> = std::result::Result<T, ExecError>;
