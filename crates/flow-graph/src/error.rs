use flow_core::NodeId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("invalid edge {edge_id}: {reason}")]
    InvalidEdge { edge_id: String, reason: String },

    #[error("graph is not a DAG (cycle detected)")]
    NotADag,

    #[error("graph is empty")]
    EmptyGraph,

    #[error("failed to process all nodes; unprocessed: {0:?}")]
    UnprocessedNodes(Vec<NodeId>),

    #[error("node error: {0}")]
    Node(#[from] flow_core::NodeError),
}

pub type Result<T> = std::result::Result<T, GraphError>;
