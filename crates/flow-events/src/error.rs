use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    /// Surfaced by the SSE bridge when a client-supplied cursor predates the
    /// stream's retained window; recovered locally by resetting the cursor.
    #[error("stream cursor invalid for user {user_id}")]
    StreamCursorInvalid { user_id: String },
}

pub type Result<T> = std::result::Result<T, EventError>;
