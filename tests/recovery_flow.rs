//! Crash/restart recovery: the KV runtime blob is the whole truth a fresh
//! process needs.

mod common;

use cardroom::config::TimingConfig;
use cardroom::db::models::TableRow;
use cardroom::db::tables as table_repo;
use cardroom::engine::TableEngine;
use cardroom::kv::MemoryKv;
use cardroom::store::RuntimeStore;
use cardroom::ws::RoomBus;
use common::{create_user, stack_of};
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

fn no_fire_timing() -> TimingConfig {
    TimingConfig {
        turn_time_ms: 600_000,
        away_timeouts_in_row: 2,
        street_pre_delay_ms: 1,
        board_card_interval_ms: 1,
        street_post_delay_ms: 1,
        win_by_fold_hold_ms: 600_000,
        showdown_hold_ms: 600_000,
    }
}

struct Cluster {
    pool: cardroom::db::DbPool,
    kv: Arc<MemoryKv>,
    table_id: String,
}

/// A table mid-hand on a shared KV, built by a "first process" engine.
async fn running_hand() -> (Arc<TableEngine>, Cluster) {
    let pool = cardroom::create_test_db().await;
    let kv = Arc::new(MemoryKv::new());
    let rooms = Arc::new(RoomBus::new());
    let engine = TableEngine::with_rng(
        pool.clone(),
        kv.clone(),
        rooms,
        no_fire_timing(),
        rand_chacha::ChaCha20Rng::seed_from_u64(51),
    );

    for user in ["u1", "u2"] {
        create_user(&pool, user).await;
    }
    let table = TableRow::new("Recovery Table".to_string(), 5, 10, 6);
    table_repo::create_table(&pool, &table).await.unwrap();
    for (user, seat) in [("u1", 1), ("u2", 2)] {
        table_repo::take_seat(&pool, &table.id, seat, user, 1000)
            .await
            .unwrap()
            .unwrap();
    }
    assert!(engine.try_start_hand(&table.id).await.unwrap());

    (
        engine,
        Cluster {
            pool,
            kv,
            table_id: table.id,
        },
    )
}

/// A restarted process sees the stored hand, reports it in snapshots, and
/// re-arms the timer from the stored deadline.
#[tokio::test]
async fn test_recovery_rebuilds_timer_from_runtime() {
    let (_old_engine, cluster) = running_hand().await;

    let fresh = TableEngine::with_rng(
        cluster.pool.clone(),
        cluster.kv.clone(),
        Arc::new(RoomBus::new()),
        no_fire_timing(),
        rand_chacha::ChaCha20Rng::seed_from_u64(52),
    );

    assert!(fresh.clock().armed_key(&cluster.table_id).is_none());
    let recovered = fresh.recover().await.unwrap();
    assert_eq!(recovered, 1);

    let key = fresh
        .clock()
        .armed_key(&cluster.table_id)
        .expect("timer rebuilt from turn_ends_at");

    let snapshot = fresh.snapshot(&cluster.table_id).await.unwrap();
    let game = snapshot.game.as_ref().expect("stored hand visible");
    assert_eq!(game.turn_ends_at, Some(key.ends_at));
    assert_eq!(game.hand_id, key.hand_id);
}

/// A past-due deadline fires immediately after recovery: the default action
/// applies and the hand converges as if the crash never happened.
#[tokio::test]
async fn test_past_due_timer_fires_after_recovery() {
    let (_old_engine, cluster) = running_hand().await;

    // Simulate the crash happening 500ms after the deadline.
    let store = RuntimeStore::new(cluster.kv.clone());
    let mut rt = store
        .load_runtime(&cluster.table_id)
        .await
        .unwrap()
        .unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    rt.turn_ends_at = Some(now - 500);
    store.save_runtime(&cluster.table_id, &rt).await.unwrap();

    let fresh = TableEngine::with_rng(
        cluster.pool.clone(),
        cluster.kv.clone(),
        Arc::new(RoomBus::new()),
        no_fire_timing(),
        rand_chacha::ChaCha20Rng::seed_from_u64(53),
    );
    fresh.recover().await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    // HU preflop, seat 1 owed the small-blind completion: the forced fold
    // hands seat 2 the blinds.
    assert!(fresh.snapshot(&cluster.table_id).await.unwrap().game.is_none());
    assert_eq!(stack_of(&cluster.pool, &cluster.table_id, "u2").await, Some(1005));
    assert_eq!(stack_of(&cluster.pool, &cluster.table_id, "u1").await, Some(995));
}

/// Recovery is harmless when nothing was running.
#[tokio::test]
async fn test_recovery_with_clean_kv() {
    let pool = cardroom::create_test_db().await;
    let fresh = TableEngine::with_rng(
        pool,
        Arc::new(MemoryKv::new()),
        Arc::new(RoomBus::new()),
        no_fire_timing(),
        rand_chacha::ChaCha20Rng::seed_from_u64(54),
    );
    assert_eq!(fresh.recover().await.unwrap(), 0);
}
