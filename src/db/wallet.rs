//! Wallet operations. Every balance change happens inside a transaction and
//! appends an entry to the append-only ledger.

use crate::db::models::LedgerEntry;
use crate::db::DbPool;
use crate::game::error::{GameError, GameResult};
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

pub async fn create_wallet(pool: &DbPool, user_id: &str, balance: i64) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO wallets (user_id, balance) VALUES (?, ?)")
        .bind(user_id)
        .bind(balance)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn balance(pool: &DbPool, user_id: &str) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM wallets WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(b,)| b))
}

/// Removes chips from a wallet within the caller's transaction. Fails the
/// whole transaction when the wallet is missing or short.
pub async fn debit_tx(
    tx: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    kind: &str,
    table_id: Option<&str>,
) -> Result<GameResult<()>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM wallets WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some((balance,)) = row else {
        return Ok(Err(GameError::WalletNotFound));
    };
    if balance < amount {
        return Ok(Err(GameError::InsufficientFunds {
            required: amount,
            available: balance,
        }));
    }

    sqlx::query("UPDATE wallets SET balance = balance - ? WHERE user_id = ?")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    append_ledger_tx(tx, user_id, -amount, kind, table_id).await?;
    Ok(Ok(()))
}

/// Adds chips to a wallet within the caller's transaction.
pub async fn credit_tx(
    tx: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    kind: &str,
    table_id: Option<&str>,
) -> Result<GameResult<()>, sqlx::Error> {
    let updated = sqlx::query("UPDATE wallets SET balance = balance + ? WHERE user_id = ?")
        .bind(amount)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Ok(Err(GameError::WalletNotFound));
    }
    append_ledger_tx(tx, user_id, amount, kind, table_id).await?;
    Ok(Ok(()))
}

async fn append_ledger_tx(
    tx: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    kind: &str,
    table_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO wallet_ledger (id, user_id, amount, kind, table_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(amount)
    .bind(kind)
    .bind(table_id)
    .bind(Utc::now().to_rfc3339())
    .execute(tx)
    .await?;
    Ok(())
}

pub async fn ledger_for_user(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<LedgerEntry>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, user_id, amount, kind, table_id, created_at
         FROM wallet_ledger WHERE user_id = ? ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}
