//! Execution events (spec §3 "Event", component C7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kinds of event a run can publish to a user's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NodeStatusChanged,
    FlowStarted,
    FlowEnded,
    FlowFailed,
    Error,
}

/// A single record on a per-user event stream. `id` is assigned by the
/// stream itself at append time and is monotone within a `user_id` (spec §3,
/// §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub id: u64,
    pub event_type: EventType,
    pub user_id: String,
    pub run_id: String,
    pub task_id: String,
    pub node_id: Option<String>,
    pub status: Option<String>,
    pub data: Option<Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Builds [`ExecutionEvent`]s without an `id`, which the stream assigns on
/// `publish`.
#[derive(Debug, Clone)]
pub struct ExecutionEventBuilder {
    event_type: EventType,
    user_id: String,
    run_id: String,
    task_id: String,
    node_id: Option<String>,
    status: Option<String>,
    data: Option<Value>,
}

impl ExecutionEventBuilder {
    pub fn new(event_type: EventType, user_id: impl Into<String>, run_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            event_type,
            user_id: user_id.into(),
            run_id: run_id.into(),
            task_id: task_id.into(),
            node_id: None,
            status: None,
            data: None,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Finalizes the event, stamping `timestamp`; `id` is filled in by the
    /// stream on append.
    pub fn build(self) -> ExecutionEvent {
        ExecutionEvent {
            id: 0,
            event_type: self.event_type,
            user_id: self.user_id,
            run_id: self.run_id,
            task_id: self.task_id,
            node_id: self.node_id,
            status: self.status,
            data: self.data,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// SSE framing for a single event (spec §6 "SSE frames").
pub fn to_sse_frame(event: &ExecutionEvent) -> String {
    let payload = serde_json::json!({
        "event": "USER_EVENT",
        "id": event.id.to_string(),
        "user_id": event.user_id,
        "event_type": event.event_type,
        "data": event.data,
        "timestamp": event.timestamp,
    });
    format!("id: {}\ndata: {}\n\n", event.id, payload)
}

/// SSE framing for a structured error frame (spec §4.9 step 6).
pub fn to_sse_error_frame(message: &str) -> String {
    let payload = serde_json::json!({ "event": "ERROR", "error": message });
    format!("event: ERROR\ndata: {payload}\n\n")
}
