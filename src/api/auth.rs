use crate::db::models::{ledger_kind, User};
use crate::db::wallet;
use crate::error::{AppError, Result};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;

/// Chips granted to a fresh account so it can sit down somewhere.
const STARTING_BALANCE: i64 = 10_000;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
        }
    }
}

pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>> {
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err(AppError::Validation(
            "Username must be 3-32 characters".to_string(),
        ));
    }
    if req.password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(&req.username)
        .fetch_optional(&state.pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Username already taken".to_string()));
    }

    let password_hash = bcrypt::hash(req.password.as_bytes(), bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Hash failure: {}", e)))?;
    let user = User::new(req.username, password_hash);

    sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.created_at)
        .execute(&state.pool)
        .await?;

    wallet::create_wallet(&state.pool, &user.id, 0).await?;
    let mut tx = state.pool.begin().await?;
    wallet::credit_tx(&mut tx, &user.id, STARTING_BALANCE, ledger_kind::DEPOSIT, None)
        .await?
        .map_err(|e| AppError::Internal(e.to_string()))?;
    tx.commit().await?;

    let token = state
        .jwt_manager
        .issue(user.id.clone(), user.username.clone())?;

    tracing::info!("Registered user {} ({})", user.username, user.id);
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(&req.username)
        .fetch_optional(&state.pool)
        .await?;

    let Some(user) = user else {
        return Err(AppError::Auth("Invalid credentials".to_string()));
    };

    let valid = bcrypt::verify(req.password.as_bytes(), &user.password_hash)
        .map_err(|e| AppError::Internal(format!("Hash failure: {}", e)))?;
    if !valid {
        return Err(AppError::Auth("Invalid credentials".to_string()));
    }

    let token = state
        .jwt_manager
        .issue(user.id.clone(), user.username.clone())?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}
