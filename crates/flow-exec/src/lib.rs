//! Layered parallel graph executor — schedules compiled plans onto a
//! bounded worker pool, propagates outputs between layers, and emits
//! lifecycle events (C6).

pub mod error;
pub mod executor;
pub mod result;
pub mod router;

pub use error::{ExecError, Result};
pub use executor::Executor;
pub use result::{ChatOutput, ExecutionResult, NodeResult};
