//! SSE Event Bridge (C9, spec §4.9): reads a per-user stream from a cursor
//! and delivers it to one client, self-healing on invalid cursors.
//!
//! Grounded on the original `stream_user_events` route (an
//! `asyncio.to_thread(redis_client.xread, ...)` poll loop with a 5 s block
//! and a 200 ms backoff on the known "Invalid stream ID" failure mode);
//! [`SseLoop`] is the read loop extracted from the axum handler so it can be
//! driven and tested without a live HTTP connection.

use std::time::Duration;

use flow_events::{parse_since_id, to_sse_error_frame, to_sse_frame, EventStream, BEGINNING};

use crate::config::SseConfig;

/// Outcome of one [`SseLoop::tick`]: either a batch of ready-to-send frames
/// (possibly empty) or a signal that the cursor has gone invalid mid-loop
/// and the caller must route through [`SseLoop::recover_from_cursor_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseTick {
    Frame(String),
    CursorInvalid,
}

/// One client's position in a user's event stream, plus the polling
/// parameters it was opened with.
pub struct SseLoop {
    events: EventStream,
    user_id: String,
    cursor: u64,
    max_messages: usize,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl SseLoop {
    pub fn new(events: EventStream, user_id: impl Into<String>, since_id: &str, config: &SseConfig) -> Self {
        let user_id = user_id.into();
        let cursor = match parse_since_id(since_id, &user_id) {
            Ok(cursor) => cursor,
            Err(err) => {
                tracing::warn!(user_id = %user_id, %err, "invalid since_id on stream open, starting from beginning");
                BEGINNING
            }
        };
        Self {
            events,
            user_id,
            cursor,
            max_messages: config.max_messages_per_read,
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// One iteration of the read loop (spec §4.9 steps 3-4): blocks up to
    /// `poll_interval`, reads up to `max_messages` new events, advances the
    /// cursor, and returns the concatenated SSE frames (possibly empty). If
    /// the cursor has gone invalid since it was last accepted, returns
    /// [`SseTick::CursorInvalid`] instead of reading anything.
    pub async fn tick(&mut self) -> SseTick {
        tokio::time::sleep(self.poll_interval).await;
        let mut events = match self.events.since(&self.user_id, self.cursor) {
            Ok(events) => events,
            Err(_) => return SseTick::CursorInvalid,
        };
        events.truncate(self.max_messages);

        let mut frames = String::new();
        for event in &events {
            self.cursor = self.cursor.max(event.id);
            frames.push_str(&to_sse_frame(event));
        }
        SseTick::Frame(frames)
    }

    /// Recovers from an invalid-cursor error (spec §4.9 step 5): resets the
    /// cursor to the beginning, logs a warning, and enforces the mandatory
    /// backoff so a repeating failure never tight-loops.
    pub async fn recover_from_cursor_error(&mut self) -> String {
        tracing::warn!(user_id = %self.user_id, "stream cursor invalid mid-read, resetting to beginning");
        self.cursor = BEGINNING;
        tokio::time::sleep(self.error_backoff.max(Duration::from_millis(200))).await;
        to_sse_error_frame("stream cursor invalid, resumed from beginning")
    }
}
