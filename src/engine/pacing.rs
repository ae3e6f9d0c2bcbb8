//! Board-reveal pacing and the auto-runout loop.
//!
//! Reveals run as a spawned task with cooperative sleeps; each card is
//! persisted and broadcast under the table lock, which is released again
//! before the next delay. A per-table flag drops overlapping sequences.

use super::{FlushResult, PostAction, TableEngine};
use crate::config::AUTO_RUNOUT_MAX_STEPS;
use crate::game::betting::ApplyOutcome;
use std::sync::Arc;
use std::time::Duration;

/// What the completion of one street's reveal left behind.
enum Next {
    Done,
    Reveal,
}

impl TableEngine {
    /// Launches the reveal sequence for a table. A sequence already in
    /// flight wins; this call is dropped.
    pub(crate) fn spawn_reveal(self: &Arc<Self>, table_id: &str) {
        {
            let mut revealing = self.revealing.lock().expect("revealing mutex poisoned");
            if !revealing.insert(table_id.to_string()) {
                tracing::debug!("Reveal already running on table {}, dropping", table_id);
                return;
            }
        }

        let engine = self.clone();
        let table_id = table_id.to_string();
        tokio::spawn(async move {
            let result = engine.run_reveal(&table_id).await;
            engine
                .revealing
                .lock()
                .expect("revealing mutex poisoned")
                .remove(&table_id);
            if let Err(e) = result {
                tracing::error!("Board reveal on table {} failed: {}", table_id, e);
            }
        });
    }

    async fn run_reveal(self: &Arc<Self>, table_id: &str) -> super::EngineResult<()> {
        let timing = self.timing().clone();

        // Bounded: a full runout is at most three street reveals, the guard
        // catches anything pathological.
        for step in 0.. {
            if step >= AUTO_RUNOUT_MAX_STEPS {
                tracing::error!("Reveal loop exceeded {} steps on table {}", step, table_id);
                return Ok(());
            }

            tokio::time::sleep(Duration::from_millis(timing.street_pre_delay_ms)).await;

            // One card per iteration: pop, persist, broadcast, wait.
            loop {
                let revealed = {
                    let _guard = self.lock_table(table_id).await;
                    let Some(mut rt) = self.store().load_runtime(table_id).await? else {
                        return Ok(());
                    };
                    if rt.pending_board.is_empty() {
                        false
                    } else {
                        let card = rt.pending_board.remove(0);
                        rt.board.push(card);
                        self.store().save_runtime(table_id, &rt).await?;
                        self.broadcast_snapshot(table_id, Some(&rt)).await?;
                        true
                    }
                };
                if !revealed {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(timing.board_card_interval_ms)).await;
            }

            let next = self.complete_street_reveal(table_id).await?;
            tokio::time::sleep(Duration::from_millis(timing.street_post_delay_ms)).await;

            match next {
                Next::Done => return Ok(()),
                Next::Reveal => continue,
            }
        }
        Ok(())
    }

    /// Runs under the table lock once a street's cards are all out: clears
    /// the dealing flag, flushes departures (this is a safe point), and
    /// either re-arms the clock or advances the runout.
    async fn complete_street_reveal(self: &Arc<Self>, table_id: &str) -> super::EngineResult<Next> {
        let _guard = self.lock_table(table_id).await;
        let Some(mut rt) = self.store().load_runtime(table_id).await? else {
            return Ok(Next::Done);
        };

        rt.pending_board.clear();
        rt.is_dealing_board = false;

        // Every completed street is a safe point for away kicks and
        // deferred leaves, auto-runout streets included.
        match self.flush_departures(table_id, Some(&mut rt)).await? {
            FlushResult::HandEnded {
                winner_seat,
                payout,
            } => {
                self.finish_fold_win(table_id, rt, winner_seat, payout)
                    .await?;
                return Ok(Next::Done);
            }
            FlushResult::Continue => {}
        }

        if rt.auto_runout {
            let outcome = rt.advance_street();
            return match outcome {
                ApplyOutcome::ShowdownReached => {
                    self.finish_showdown(table_id, rt).await?;
                    Ok(Next::Done)
                }
                ApplyOutcome::StreetAdvanced { .. } => {
                    self.store().save_runtime(table_id, &rt).await?;
                    self.broadcast_snapshot(table_id, Some(&rt)).await?;
                    Ok(Next::Reveal)
                }
                other => {
                    tracing::error!(
                        "Unexpected runout outcome {:?} on table {}",
                        other,
                        table_id
                    );
                    self.store().save_runtime(table_id, &rt).await?;
                    Ok(Next::Done)
                }
            };
        }

        // Hand the table back to the betting engine: arm the clock (or chain
        // sitting-out auto-actions, or keep running if the flush settled the
        // street).
        match self
            .progress_after_apply(table_id, rt, ApplyOutcome::TurnAdvanced)
            .await?
        {
            PostAction::RevealPending => Ok(Next::Reveal),
            PostAction::Idle => Ok(Next::Done),
        }
    }
}
