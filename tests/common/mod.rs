//! Shared scaffolding for engine-level integration tests: an in-memory
//! stack with fast pacing and a seedable deck.
#![allow(dead_code)] // not every test binary uses every helper

use cardroom::config::TimingConfig;
use cardroom::db::models::TableRow;
use cardroom::db::{tables as table_repo, wallet, DbPool};
use cardroom::engine::TableEngine;
use cardroom::ws::RoomBus;
use std::sync::Arc;

/// Pacing tuned for tests: reveals are near-instant, the turn clock and
/// post-hand holds are long enough to never fire unless a test wants them.
pub fn quiet_timing() -> TimingConfig {
    TimingConfig {
        turn_time_ms: 60_000,
        away_timeouts_in_row: 2,
        street_pre_delay_ms: 1,
        board_card_interval_ms: 1,
        street_post_delay_ms: 1,
        win_by_fold_hold_ms: 120_000,
        showdown_hold_ms: 120_000,
    }
}

pub struct TestTable {
    pub engine: Arc<TableEngine>,
    pub rooms: Arc<RoomBus>,
    pub pool: DbPool,
    pub table_id: String,
}

/// A table with blinds 5/10 and the given `(user, seat, buy_in)` players
/// seated. Seats are taken directly against the repository so the first
/// hand only starts when the test calls `start_hand`.
pub async fn table_with_players(
    timing: TimingConfig,
    seed: u64,
    players: &[(&str, usize, i64)],
) -> TestTable {
    let (engine, rooms, pool) = cardroom::create_test_engine(timing, seed).await;

    for (user_id, _, _) in players {
        create_user(&pool, user_id).await;
    }

    let table = TableRow::new("Test Table".to_string(), 5, 10, 6);
    table_repo::create_table(&pool, &table).await.unwrap();

    for (user_id, seat_no, buy_in) in players {
        table_repo::take_seat(&pool, &table.id, *seat_no, user_id, *buy_in)
            .await
            .unwrap()
            .unwrap();
    }

    TestTable {
        engine,
        rooms,
        pool,
        table_id: table.id,
    }
}

impl TestTable {
    pub async fn start_hand(&self) {
        assert!(self.engine.try_start_hand(&self.table_id).await.unwrap());
    }
}

pub async fn create_user(pool: &DbPool, user_id: &str) {
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, 'x', 'now')",
    )
    .bind(user_id)
    .bind(format!("name-{}", user_id))
    .execute(pool)
    .await
    .unwrap();
    wallet::create_wallet(pool, user_id, 10_000).await.unwrap();
}

pub async fn stack_of(pool: &DbPool, table_id: &str, user_id: &str) -> Option<i64> {
    table_repo::seat_of_user(pool, table_id, user_id)
        .await
        .unwrap()
        .map(|s| s.stack)
}
