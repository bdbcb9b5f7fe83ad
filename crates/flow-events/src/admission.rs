//! Admission / slot manager (spec §4.8, component C8).
//!
//! Grounded on the teacher's `DashMap`-backed rate limiter: per-key atomic
//! state behind a concurrent map, no global lock. Unlike a token bucket this
//! is a plain bounded counter — at most `max_per_user` concurrent heavy tasks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

/// Per-user concurrent-slot ledger (spec §3 "Slot ledger"). Entries are
/// created lazily on first `acquire`.
#[derive(Clone)]
pub struct SlotManager {
    slots: Arc<DashMap<String, Arc<AtomicU32>>>,
    max_per_user: u32,
}

impl SlotManager {
    pub fn new(max_per_user: u32) -> Self {
        Self { slots: Arc::new(DashMap::new()), max_per_user }
    }

    fn counter(&self, user_id: &str) -> Arc<AtomicU32> {
        self.slots.entry(user_id.to_string()).or_insert_with(|| Arc::new(AtomicU32::new(0))).clone()
    }

    /// Atomically checks-and-increments if the current count is below the
    /// per-user maximum. Safe under concurrent contention: loops a
    /// compare-exchange rather than check-then-set.
    pub fn acquire(&self, user_id: &str) -> bool {
        let counter = self.counter(user_id);
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= self.max_per_user {
                return false;
            }
            match counter.compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Decrements the user's in-flight count, floored at zero. Idempotent:
    /// calling this more times than `acquire` succeeded is a no-op past zero.
    pub fn release(&self, user_id: &str) {
        let counter = self.counter(user_id);
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return;
            }
            match counter.compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn in_flight(&self, user_id: &str) -> u32 {
        self.counter(user_id).load(Ordering::SeqCst)
    }
}

/// A single-shot idempotent release guard (spec §9 "Terminator" design note).
/// Both the normal completion path and a termination-signal handler call
/// `finish`; only the first call has any effect.
pub struct Terminator {
    manager: SlotManager,
    user_id: String,
    done: Arc<std::sync::atomic::AtomicBool>,
}

impl Terminator {
    pub fn new(manager: SlotManager, user_id: impl Into<String>) -> Self {
        Self { manager, user_id: user_id.into(), done: Arc::new(std::sync::atomic::AtomicBool::new(false)) }
    }

    /// Releases the held slot exactly once, regardless of how many times or
    /// from how many call sites this is invoked.
    pub fn finish(&self) {
        if self
            .done
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.manager.release(&self.user_id);
        }
    }
}

/// Jittered backoff for a dispatcher re-queue after admission is denied
/// (spec §4.8: "base 6s ± 3s").
pub fn admission_backoff(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as f64;
    let offset_ms = (rand::random::<f64>() * 2.0 - 1.0) * jitter_ms;
    let delay_ms = (base.as_millis() as f64 + offset_ms).max(0.0);
    Duration::from_millis(delay_ms as u64)
}
