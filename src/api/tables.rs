use crate::auth::SocketIdentity;
use crate::db::models::TableRow;
use crate::db::tables as table_repo;
use crate::error::{AppError, Result};
use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use super::AppState;

pub fn tables_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tables))
        .route("/", post(create_table))
}

fn authed(state: &AppState, headers: &HeaderMap) -> Result<SocketIdentity> {
    let header = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    state.jwt_manager.identify_bearer(header)
}

async fn list_tables(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TableRow>>> {
    authed(&state, &headers)?;
    let tables = table_repo::list_tables(&state.pool).await?;
    Ok(Json(tables))
}

#[derive(Debug, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    pub small_blind: i64,
    pub big_blind: i64,
    #[serde(default = "default_max_seats")]
    pub max_seats: i64,
}

fn default_max_seats() -> i64 {
    9
}

async fn create_table(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTableRequest>,
) -> Result<Json<TableRow>> {
    let user = authed(&state, &headers)?;

    if req.name.is_empty() || req.name.len() > 64 {
        return Err(AppError::Validation("Invalid table name".to_string()));
    }
    if req.small_blind <= 0 || req.big_blind <= req.small_blind {
        return Err(AppError::Validation(
            "Blinds must satisfy 0 < SB < BB".to_string(),
        ));
    }
    if !(2..=9).contains(&req.max_seats) {
        return Err(AppError::Validation(
            "Table size must be 2-9 seats".to_string(),
        ));
    }

    let table = TableRow::new(req.name, req.small_blind, req.big_blind, req.max_seats);
    table_repo::create_table(&state.pool, &table).await?;
    tracing::info!(
        "User {} ({}) created table {} ({})",
        user.username,
        user.user_id,
        table.name,
        table.id
    );
    Ok(Json(table))
}
