//! HTTP route definitions: the SSE bridge (C9) endpoint plus the thin
//! wrappers around the task dispatcher (C10).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;

use flow_graph::GraphRequest;

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::dispatcher::TaskDispatcher;
use crate::error::ApiError;
use crate::middleware::{cors_layer, trace_layer};
use crate::sse::{SseLoop, SseTick};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<TaskDispatcher>,
    pub auth: Arc<dyn TokenVerifier>,
    pub config: Arc<ServerConfig>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/user-events/stream/:user_id/events", get(stream_user_events))
        .route("/flows/:flow_id/compile", post(compile_flow))
        .route("/flows/:flow_id/run", post(run_flow))
        .layer(trace_layer())
        .layer(cors_layer())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// `GET /user-events/stream/{user_id}/events?since_id=&token=` (spec §4.9).
async fn stream_user_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let token = params.get("token").cloned().unwrap_or_default();
    if token.is_empty() {
        return Err(ApiError::Forbidden("missing access token".into()));
    }
    let subject = state.auth.verify(&token).ok_or_else(|| ApiError::Forbidden("invalid access token".into()))?;
    if subject != user_id {
        return Err(ApiError::Forbidden("token subject does not match user_id".into()));
    }

    let since_id = params.get("since_id").cloned().unwrap_or_default();
    let sse = SseLoop::new(state.dispatcher.events().clone(), user_id, &since_id, &state.config.sse);

    let body_stream = stream::unfold(sse, |mut sse| async move {
        let chunk = match sse.tick().await {
            SseTick::Frame(frame) => frame,
            SseTick::CursorInvalid => sse.recover_from_cursor_error().await,
        };
        Some((Ok::<_, std::io::Error>(chunk), sse))
    });

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(response)
}

/// `POST /flows/{flow_id}/compile` — thin wrapper over `TaskDispatcher::compile_flow`.
async fn compile_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    Json(request): Json<GraphRequest>,
) -> Result<Json<crate::dispatcher::CompileStatus>, ApiError> {
    Ok(Json(state.dispatcher.compile_flow(&flow_id, request)?))
}

#[derive(serde::Deserialize)]
struct RunFlowParams {
    user_id: String,
    #[serde(default)]
    enable_debug: bool,
}

/// `POST /flows/{flow_id}/run?user_id=...` — thin wrapper over `TaskDispatcher::run_flow`.
async fn run_flow(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    Query(params): Query<RunFlowParams>,
    Json(request): Json<GraphRequest>,
) -> Result<Json<flow_exec::ExecutionResult>, ApiError> {
    let result = state.dispatcher.run_flow(&params.user_id, &flow_id, request, params.enable_debug).await?;
    Ok(Json(result))
}
