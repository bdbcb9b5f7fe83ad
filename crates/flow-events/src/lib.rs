//! Per-user execution event stream and admission/slot manager (C7, C8).

pub mod admission;
pub mod error;
pub mod event;
pub mod stream;

pub use admission::{admission_backoff, SlotManager, Terminator};
pub use error::{EventError, Result};
pub use event::{to_sse_error_frame, to_sse_frame, EventType, ExecutionEvent, ExecutionEventBuilder};
pub use stream::{normalize_since_id, parse_since_id, EventStream, BEGINNING};
