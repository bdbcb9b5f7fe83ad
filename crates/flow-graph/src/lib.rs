//! Graph loader and layered DAG compiler — the graph-shaped vocabulary
//! consumed by the executor (C3, C4).

pub mod compiler;
pub mod error;
pub mod graph;
pub mod loader;
pub mod plan;
pub mod registry;

pub use compiler::compile;
pub use error::{GraphError, Result};
pub use graph::{Edge, Graph, NodeEntry};
pub use loader::{load, EdgeRec, GraphRequest, NodeRec};
pub use plan::{ExecutionPlan, PlanStats};
pub use registry::{Factory, NodeRegistry};
