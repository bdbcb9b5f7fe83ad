//! Node contract, handle/adapter registry, and execution context/control —
//! the vocabulary shared by the graph compiler and the executor.

pub mod context;
pub mod error;
pub mod handle;
pub mod node;

pub use context::{ExecutionContext, ExecutionControl, ExecutionScope, NodeId, Repositories};
pub use error::{NodeError, Result};
pub use handle::{strip_index_suffix, AdapterRegistry, ClientResolver, HandleKind, HandleSpec};
pub use node::{ExecutionStatus, Node, NodeData, NodeInput, NodeOutput, NodeSpec, ParamSpec, ToolDescriptor};
