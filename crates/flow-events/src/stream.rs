//! Per-user ordered execution event stream (spec §4.7, component C7).
//!
//! Grounded on the teacher's `EventHistory` replay buffer: an append-only
//! `VecDeque` guarded by a lock, with a monotone sequence counter. Unlike the
//! teacher's fixed-size ring, every user's stream is unbounded here — at-least-
//! once delivery across reconnects requires retaining history back to the
//! oldest cursor a client might still present.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::EventError;
use crate::event::{EventType, ExecutionEvent};

/// The sentinel cursor meaning "from the beginning of the stream".
pub const BEGINNING: u64 = 0;

struct UserStream {
    events: Mutex<VecDeque<ExecutionEvent>>,
    next_id: AtomicU64,
}

impl UserStream {
    fn new() -> Self {
        Self { events: Mutex::new(VecDeque::new()), next_id: AtomicU64::new(1) }
    }
}

/// An append-only, per-user ordered event stream keyed by `user_events:{user_id}`
/// (spec §4.7). Readers never mutate; only `publish` appends.
#[derive(Clone, Default)]
pub struct EventStream {
    users: Arc<Mutex<HashMap<String, Arc<UserStream>>>>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn user_stream(&self, user_id: &str) -> Arc<UserStream> {
        let mut users = self.users.lock();
        users.entry(user_id.to_string()).or_insert_with(|| Arc::new(UserStream::new())).clone()
    }

    /// Appends `event` to `user_id`'s stream, assigning the next monotone id.
    /// Returns the assigned id.
    pub fn publish(&self, user_id: &str, mut event: ExecutionEvent) -> u64 {
        let stream = self.user_stream(user_id);
        let id = stream.next_id.fetch_add(1, Ordering::SeqCst);
        event.id = id;
        stream.events.lock().push_back(event);
        id
    }

    /// Events strictly after `since_id` (spec §6 "since_id is the sentinel
    /// empty value or \"0\" means from the beginning"). Fails with
    /// [`EventError::StreamCursorInvalid`] when `since_id` is ahead of every
    /// id this stream has ever assigned — a cursor that can never legitimately
    /// occur and is the self-heal trigger for the SSE bridge (spec §4.9 step 5).
    pub fn since(&self, user_id: &str, since_id: u64) -> crate::error::Result<Vec<ExecutionEvent>> {
        let stream = self.user_stream(user_id);
        let highest_assigned = stream.next_id.load(Ordering::SeqCst).saturating_sub(1);
        if since_id != BEGINNING && since_id > highest_assigned {
            return Err(EventError::StreamCursorInvalid { user_id: user_id.to_string() });
        }
        Ok(stream.events.lock().iter().filter(|e| e.id > since_id).cloned().collect())
    }

    /// The id of the most recently published event, or `BEGINNING` if none.
    pub fn last_id(&self, user_id: &str) -> u64 {
        let stream = self.user_stream(user_id);
        stream.events.lock().back().map(|e| e.id).unwrap_or(BEGINNING)
    }
}

/// Normalizes a client-supplied cursor: an empty string or `"0"` both mean
/// "from the beginning" (spec §4.9 step 2).
pub fn normalize_since_id(raw: &str) -> u64 {
    if raw.is_empty() || raw == "0" {
        BEGINNING
    } else {
        raw.parse().unwrap_or(BEGINNING)
    }
}

pub fn event_type_matches(event: &ExecutionEvent, kind: EventType) -> bool {
    event.event_type == kind
}

/// Like [`normalize_since_id`] but rejects a cursor that is neither the
/// beginning sentinel nor a parseable id, so the SSE bridge can self-heal
/// (spec §4.9 step 5) instead of silently resetting every malformed cursor.
pub fn parse_since_id(raw: &str, user_id: &str) -> crate::error::Result<u64> {
    if raw.is_empty() || raw == "0" {
        return Ok(BEGINNING);
    }
    raw.parse().map_err(|_| EventError::StreamCursorInvalid { user_id: user_id.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ExecutionEventBuilder;

    fn event(kind: EventType) -> ExecutionEvent {
        ExecutionEventBuilder::new(kind, "u1", "r1", "t1").build()
    }

    #[test]
    fn publish_assigns_monotone_ids() {
        let stream = EventStream::new();
        let first = stream.publish("u1", event(EventType::FlowStarted));
        let second = stream.publish("u1", event(EventType::FlowEnded));
        assert!(second > first);
    }

    #[test]
    fn since_excludes_already_delivered_events() {
        let stream = EventStream::new();
        let first = stream.publish("u1", event(EventType::FlowStarted));
        stream.publish("u1", event(EventType::NodeStatusChanged));
        let remaining = stream.since("u1", first).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn reconnect_from_last_id_yields_only_new_events() {
        let stream = EventStream::new();
        stream.publish("u1", event(EventType::FlowStarted));
        let k = stream.last_id("u1");
        for _ in 0..3 {
            stream.publish("u1", event(EventType::NodeStatusChanged));
        }
        assert_eq!(stream.since("u1", k).unwrap().len(), 3);
    }

    #[test]
    fn since_rejects_a_cursor_ahead_of_every_assigned_id() {
        let stream = EventStream::new();
        stream.publish("u1", event(EventType::FlowStarted));
        assert!(matches!(stream.since("u1", 999), Err(EventError::StreamCursorInvalid { .. })));
    }

    #[test]
    fn normalize_since_id_treats_empty_and_zero_as_beginning() {
        assert_eq!(normalize_since_id(""), BEGINNING);
        assert_eq!(normalize_since_id("0"), BEGINNING);
        assert_eq!(normalize_since_id("42"), 42);
    }

    #[test]
    fn streams_are_independent_per_user() {
        let stream = EventStream::new();
        stream.publish("u1", event(EventType::FlowStarted));
        assert!(stream.since("u2", BEGINNING).unwrap().is_empty());
    }

    #[test]
    fn parse_since_id_rejects_garbage_cursors() {
        assert_eq!(parse_since_id("", "u1").unwrap(), BEGINNING);
        assert_eq!(parse_since_id("0", "u1").unwrap(), BEGINNING);
        assert_eq!(parse_since_id("7", "u1").unwrap(), 7);
        assert!(parse_since_id("not-a-number", "u1").is_err());
    }
}
