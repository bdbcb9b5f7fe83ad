//! HTTP surface for the flow execution core: the SSE event bridge (C9) and
//! the task dispatcher (C10). Everything below C10 — the compiler, executor,
//! and event/admission primitives — lives in `flow-graph`, `flow-exec`, and
//! `flow-events`; this crate only wires them to axum.

pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod sse;

pub use config::ServerConfig;
pub use dispatcher::TaskDispatcher;
pub use routes::{create_router, AppState};
