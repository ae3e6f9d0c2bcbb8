//! Boot recovery: the KV runtime is the source of truth; a fresh process
//! only has to rebuild its in-memory timers from it.

use super::{TableEngine, TimerKey};
use std::sync::Arc;

impl TableEngine {
    /// Scans the KV store for in-flight hands and rebuilds per-table state:
    /// turn timers re-arm from `turn_ends_at` (past-due deadlines fire
    /// immediately), interrupted reveals resume, and whoever is in the room
    /// gets a fresh snapshot.
    pub async fn recover(self: &Arc<Self>) -> super::EngineResult<usize> {
        let table_ids = self.store().running_table_ids().await?;
        let mut recovered = 0;

        for table_id in table_ids {
            match self.recover_table(&table_id).await {
                Ok(()) => recovered += 1,
                Err(e) => {
                    tracing::error!("Failed to recover table {}: {}", table_id, e);
                }
            }
        }

        tracing::info!("Recovery complete: {} table(s) resumed", recovered);
        Ok(recovered)
    }

    async fn recover_table(self: &Arc<Self>, table_id: &str) -> super::EngineResult<()> {
        let _guard = self.lock_table(table_id).await;
        let Some(rt) = self.store().load_runtime(table_id).await? else {
            return Ok(());
        };

        tracing::info!(
            "Recovering hand {} on table {} ({:?}, turn seat {:?})",
            rt.hand_id,
            table_id,
            rt.round,
            rt.current_turn_seat
        );

        self.broadcast_snapshot(table_id, Some(&rt)).await?;

        if rt.is_dealing_board || rt.auto_runout {
            // The reveal task died with the old process; pick it back up.
            drop(_guard);
            self.spawn_reveal(table_id);
            return Ok(());
        }

        if let (Some(seat_no), Some(ends_at)) = (rt.current_turn_seat, rt.turn_ends_at) {
            self.clock().schedule(
                self.clone(),
                table_id,
                TimerKey {
                    hand_id: rt.hand_id.clone(),
                    seat_no,
                    ends_at,
                },
            );
        }
        Ok(())
    }
}
