//! Cardroom — authoritative multi-table No-Limit Hold'em cash game server.
//!
//! The library target exists so integration tests can assemble the full
//! server in-process against in-memory stores.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod game;
pub mod kv;
pub mod store;
pub mod ws;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Builds the application router: REST for identity and lobby, one
/// WebSocket endpoint for everything at the table.
pub fn create_app(app_state: Arc<api::AppState>, gateway: Arc<ws::GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Cardroom" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api/auth", api::auth_router().with_state(app_state.clone()))
        .nest("/api/tables", api::tables_router().with_state(app_state))
        .route("/ws", get(ws::ws_handler).with_state(gateway))
        .layer(cors)
}

/// Test helper: in-memory database with migrations applied.
pub async fn create_test_db() -> db::DbPool {
    let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Test helper: the full application over in-memory stores.
pub async fn create_test_app() -> (Router, Arc<engine::TableEngine>) {
    let pool = create_test_db().await;
    let kv: Arc<dyn kv::KvStore> = Arc::new(kv::MemoryKv::new());
    let rooms = Arc::new(ws::RoomBus::new());
    let jwt_manager = Arc::new(auth::JwtManager::new("test_secret_key".to_string()));
    let engine = engine::TableEngine::new(
        pool.clone(),
        kv,
        rooms.clone(),
        config::TimingConfig::default(),
    );

    let app_state = Arc::new(api::AppState {
        pool,
        jwt_manager: jwt_manager.clone(),
        engine: engine.clone(),
    });
    let gateway = Arc::new(ws::GatewayState {
        engine: engine.clone(),
        rooms,
        jwt_manager,
    });
    (create_app(app_state, gateway), engine)
}

/// Test helper: a fully wired engine + gateway over in-memory stores, with
/// caller-controlled timings and a seedable deck RNG.
pub async fn create_test_engine(
    timing: config::TimingConfig,
    rng_seed: u64,
) -> (Arc<engine::TableEngine>, Arc<ws::RoomBus>, db::DbPool) {
    use rand::SeedableRng;

    let pool = create_test_db().await;
    let kv = Arc::new(kv::MemoryKv::new());
    let rooms = Arc::new(ws::RoomBus::new());
    let engine = engine::TableEngine::with_rng(
        pool.clone(),
        kv,
        rooms.clone(),
        timing,
        rand_chacha::ChaCha20Rng::seed_from_u64(rng_seed),
    );
    (engine, rooms, pool)
}
