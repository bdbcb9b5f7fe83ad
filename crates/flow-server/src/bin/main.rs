//! flow-server binary: boots tracing, loads configuration, wires the
//! dispatcher (C10) and SSE bridge (C9) onto an axum router, and serves.
//!
//! The node library (concrete `Node` implementations) is out of scope for
//! this core; a real deployment registers its nodes into the `NodeRegistry`
//! before calling `main`. This binary starts with an empty registry so the
//! server is runnable standalone.

use std::sync::Arc;

use anyhow::Context;

use flow_core::AdapterRegistry;
use flow_graph::NodeRegistry;
use flow_server::auth::SubjectEqualsTokenVerifier;
use flow_server::{create_router, AppState, ServerConfig, TaskDispatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    tracing::info!("loading server configuration...");
    let config = match ServerConfig::load() {
        Ok(cfg) => {
            tracing::info!("configuration loaded successfully");
            cfg
        }
        Err(e) => {
            tracing::warn!("failed to load configuration file: {e}; using defaults");
            ServerConfig::default()
        }
    };

    tracing::info!(workers = config.execution.workers, max_per_user = config.admission.max_per_user, "execution parameters");

    let registry = Arc::new(NodeRegistry::new());
    let adapters = Arc::new(AdapterRegistry::new());
    let dispatcher = Arc::new(TaskDispatcher::new(registry, adapters, config.execution.workers, config.admission.clone()));

    let state = AppState { dispatcher, auth: Arc::new(SubjectEqualsTokenVerifier), config: Arc::new(config.clone()) };
    let app = create_router(state);

    let addr = config.bind_addr();
    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server exited with an error")?;

    Ok(())
}
