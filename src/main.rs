use cardroom::{api, auth, config, create_app, db, engine, kv, ws};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();
    tracing::info!("Starting cardroom server on {}", config.server_addr());

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connected");
    db::run_migrations(&pool).await?;

    // The relational store doubles as the durable KV, so in-flight hands
    // survive a restart.
    let kv: Arc<dyn kv::KvStore> = Arc::new(kv::SqliteKv::new(pool.clone()));

    let jwt_manager = Arc::new(auth::JwtManager::new(config.jwt_secret.clone()));
    let rooms = Arc::new(ws::RoomBus::new());
    let engine = engine::TableEngine::new(
        pool.clone(),
        kv,
        rooms.clone(),
        config.timing.clone(),
    );

    // Rebuild timers and resume interrupted reveals from the KV runtime.
    match engine.recover().await {
        Ok(count) => tracing::info!("Recovered {} in-flight hand(s)", count),
        Err(e) => tracing::error!("Boot recovery failed: {}", e),
    }

    let app_state = Arc::new(api::AppState {
        pool: pool.clone(),
        jwt_manager: jwt_manager.clone(),
        engine: engine.clone(),
    });
    let gateway = Arc::new(ws::GatewayState {
        engine: engine.clone(),
        rooms: rooms.clone(),
        jwt_manager,
    });

    let app = create_app(app_state, gateway);

    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Server listening on {}", config.server_addr());
    axum::serve(listener, app).await?;

    Ok(())
}
