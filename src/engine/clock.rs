//! The turn clock: exactly one logical timer per table.
//!
//! A timer's identity is the `(hand, seat, deadline)` tuple. Scheduling the
//! same key again is a no-op; a new key cancels and replaces the old task.
//! A fired task re-reads the runtime and drops itself silently when the
//! tuple no longer matches, so superseded timers cannot act.

use crate::engine::TableEngine;
use crate::game::now_ms;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerKey {
    pub hand_id: String,
    pub seat_no: usize,
    pub ends_at: i64,
}

struct ActiveTimer {
    key: TimerKey,
    handle: tokio::task::JoinHandle<()>,
}

#[derive(Default)]
pub struct TurnClock {
    timers: Mutex<HashMap<String, ActiveTimer>>,
}

impl TurnClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the table's timer for `key`. Idempotent for an identical key;
    /// otherwise the previous timer is aborted and replaced.
    pub fn schedule(&self, engine: Arc<TableEngine>, table_id: &str, key: TimerKey) {
        let mut timers = self.timers.lock().expect("clock mutex poisoned");

        if let Some(active) = timers.get(table_id) {
            if active.key == key && !active.handle.is_finished() {
                return;
            }
        }
        if let Some(old) = timers.remove(table_id) {
            old.handle.abort();
        }

        let delay_ms = (key.ends_at - now_ms()).max(0) as u64;
        tracing::debug!(
            "Scheduling turn timer for table {} seat {} in {}ms",
            table_id,
            key.seat_no,
            delay_ms
        );

        let task_table_id = table_id.to_string();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            engine.handle_turn_timeout(&task_table_id, task_key).await;
        });

        timers.insert(table_id.to_string(), ActiveTimer { key, handle });
    }

    /// Drops the table's timer, if any. Used while the board is dealing and
    /// once a hand ends.
    pub fn cancel(&self, table_id: &str) {
        let mut timers = self.timers.lock().expect("clock mutex poisoned");
        if let Some(old) = timers.remove(table_id) {
            old.handle.abort();
        }
    }

    /// The key currently armed for a table, for tests and diagnostics.
    pub fn armed_key(&self, table_id: &str) -> Option<TimerKey> {
        self.timers
            .lock()
            .expect("clock mutex poisoned")
            .get(table_id)
            .map(|t| t.key.clone())
    }
}
