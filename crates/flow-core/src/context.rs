//! Execution context & control (spec §4.5, component C5).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies a node within a single graph. Opaque beyond equality/hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// Marker trait for the opaque handle to external repositories (flows,
/// snapshots, sessions, …) carried by the execution context. Concrete
/// persistence is out of scope (spec §1); callers supply their own
/// implementation and the engine only ever stores it as `Arc<dyn Repositories>`.
pub trait Repositories: Send + Sync {}

/// Immutable, per-run record (spec §3, §4.5).
#[derive(Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub flow_id: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub repositories: Option<Arc<dyn Repositories>>,
}

impl ExecutionContext {
    pub fn new(run_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            flow_id: flow_id.into(),
            session_id: None,
            user_id: None,
            metadata: HashMap::new(),
            repositories: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Structured representation for logging (spec §4.5: `to_dict()`).
    pub fn to_dict(&self) -> Value {
        serde_json::json!({
            "run_id": self.run_id,
            "flow_id": self.flow_id,
            "session_id": self.session_id,
            "user_id": self.user_id,
            "metadata": self.metadata,
        })
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("flow_id", &self.flow_id)
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// The scope of a run (spec §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionScope {
    /// Execute every layer of the compiled plan.
    Full,
    /// Execute stale ancestors of `start_node`, then `start_node` and its
    /// descendants.
    FromNode,
    /// Execute exactly `start_node`.
    NodeOnly,
}

/// Declares what a run should execute (spec §4.5).
#[derive(Debug, Clone)]
pub struct ExecutionControl {
    pub scope: ExecutionScope,
    pub start_node: Option<NodeId>,
}

impl ExecutionControl {
    pub fn full() -> Self {
        Self { scope: ExecutionScope::Full, start_node: None }
    }

    pub fn from_node(start_node: NodeId) -> Self {
        Self { scope: ExecutionScope::FromNode, start_node: Some(start_node) }
    }

    pub fn node_only(start_node: NodeId) -> Self {
        Self { scope: ExecutionScope::NodeOnly, start_node: Some(start_node) }
    }
}
