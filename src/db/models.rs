use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

impl User {
    pub fn new(username: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            username,
            password_hash,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub user_id: String,
    pub balance: i64,
}

/// Why chips moved; stored on every ledger row.
pub mod ledger_kind {
    pub const DEPOSIT: &str = "DEPOSIT";
    pub const BUY_IN: &str = "BUY_IN";
    pub const REBUY: &str = "REBUY";
    pub const CASH_OUT: &str = "CASH_OUT";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    /// Positive for credits to the wallet, negative for debits.
    pub amount: i64,
    pub kind: String,
    pub table_id: Option<String>,
    pub created_at: String,
}

pub mod table_status {
    pub const WAITING: &str = "WAITING";
    pub const RUNNING: &str = "RUNNING";
}

pub mod seat_status {
    pub const SEATED: &str = "SEATED";
    pub const PLAYING: &str = "PLAYING";
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TableRow {
    pub id: String,
    pub name: String,
    pub small_blind: i64,
    pub big_blind: i64,
    pub max_seats: i64,
    pub status: String,
    pub created_at: String,
}

impl TableRow {
    pub fn new(name: String, small_blind: i64, big_blind: i64, max_seats: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            small_blind,
            big_blind,
            max_seats,
            status: table_status::WAITING.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A seat joined with its occupant's username.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeatRow {
    pub table_id: String,
    pub seat_no: i64,
    pub user_id: String,
    pub username: String,
    pub stack: i64,
    pub status: String,
    pub is_sitting_out: bool,
}
