mod auth;
mod tables;

pub use auth::auth_router;
pub use tables::tables_router;

use crate::auth::JwtManager;
use crate::db::DbPool;
use crate::engine::TableEngine;
use std::sync::Arc;

pub struct AppState {
    pub pool: DbPool,
    pub jwt_manager: Arc<JwtManager>,
    pub engine: Arc<TableEngine>,
}
