//! Table and seat repository. Buy-ins, cash-outs and stack persistence are
//! single transactions so a crash can never strand chips between the wallet
//! and the felt.

use crate::db::models::{ledger_kind, SeatRow, TableRow};
use crate::db::{wallet, DbPool};
use crate::game::error::{GameError, GameResult};
use sqlx::SqliteConnection;

pub async fn create_table(pool: &DbPool, table: &TableRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO tables (id, name, small_blind, big_blind, max_seats, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&table.id)
    .bind(&table.name)
    .bind(table.small_blind)
    .bind(table.big_blind)
    .bind(table.max_seats)
    .bind(&table.status)
    .bind(&table.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_tables(pool: &DbPool) -> Result<Vec<TableRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM tables ORDER BY created_at").fetch_all(pool).await
}

pub async fn fetch_table(pool: &DbPool, table_id: &str) -> Result<Option<TableRow>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM tables WHERE id = ?")
        .bind(table_id)
        .fetch_optional(pool)
        .await
}

pub async fn set_table_status(
    pool: &DbPool,
    table_id: &str,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE tables SET status = ? WHERE id = ?")
        .bind(status)
        .bind(table_id)
        .execute(pool)
        .await?;
    Ok(())
}

const SEAT_COLUMNS: &str = "s.table_id, s.seat_no, s.user_id, u.username, s.stack, s.status, \
                            s.is_sitting_out";

pub async fn seats_for_table(pool: &DbPool, table_id: &str) -> Result<Vec<SeatRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {} FROM seats s JOIN users u ON u.id = s.user_id
         WHERE s.table_id = ? ORDER BY s.seat_no",
        SEAT_COLUMNS
    ))
    .bind(table_id)
    .fetch_all(pool)
    .await
}

pub async fn seats_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<SeatRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {} FROM seats s JOIN users u ON u.id = s.user_id WHERE s.user_id = ?",
        SEAT_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn seat_of_user(
    pool: &DbPool,
    table_id: &str,
    user_id: &str,
) -> Result<Option<SeatRow>, sqlx::Error> {
    sqlx::query_as(&format!(
        "SELECT {} FROM seats s JOIN users u ON u.id = s.user_id
         WHERE s.table_id = ? AND s.user_id = ?",
        SEAT_COLUMNS
    ))
    .bind(table_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Atomic buy-in: verifies the seat is free and the user unseated here, then
/// debits the wallet and creates the seat in one transaction.
pub async fn take_seat(
    pool: &DbPool,
    table_id: &str,
    seat_no: usize,
    user_id: &str,
    buy_in: i64,
) -> Result<GameResult<()>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let seat_taken: Option<(String,)> =
        sqlx::query_as("SELECT user_id FROM seats WHERE table_id = ? AND seat_no = ?")
            .bind(table_id)
            .bind(seat_no as i64)
            .fetch_optional(&mut *tx)
            .await?;
    if seat_taken.is_some() {
        return Ok(Err(GameError::SeatTaken { seat_no }));
    }

    let already_here: Option<(i64,)> =
        sqlx::query_as("SELECT seat_no FROM seats WHERE table_id = ? AND user_id = ?")
            .bind(table_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    if already_here.is_some() {
        return Ok(Err(GameError::AlreadySeated));
    }

    if let Err(e) =
        wallet::debit_tx(&mut tx, user_id, buy_in, ledger_kind::BUY_IN, Some(table_id)).await?
    {
        return Ok(Err(e));
    }

    sqlx::query(
        "INSERT INTO seats (table_id, seat_no, user_id, stack, status, is_sitting_out)
         VALUES (?, ?, ?, ?, 'SEATED', 0)",
    )
    .bind(table_id)
    .bind(seat_no as i64)
    .bind(user_id)
    .bind(buy_in)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Ok(()))
}

/// Atomic cash-out: removes the seat and credits its stack back to the
/// wallet. Returns the amount cashed out.
pub async fn release_seat(
    pool: &DbPool,
    table_id: &str,
    user_id: &str,
) -> Result<GameResult<i64>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(i64,)> =
        sqlx::query_as("SELECT stack FROM seats WHERE table_id = ? AND user_id = ?")
            .bind(table_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((stack,)) = row else {
        return Ok(Err(GameError::NotSeated));
    };

    sqlx::query("DELETE FROM seats WHERE table_id = ? AND user_id = ?")
        .bind(table_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    if stack > 0 {
        if let Err(e) =
            wallet::credit_tx(&mut tx, user_id, stack, ledger_kind::CASH_OUT, Some(table_id))
                .await?
        {
            return Ok(Err(e));
        }
    }

    tx.commit().await?;
    Ok(Ok(stack))
}

/// Atomic rebuy: debits the wallet and tops up the seat stack, capped by the
/// caller-provided table maximum.
pub async fn rebuy(
    pool: &DbPool,
    table_id: &str,
    user_id: &str,
    amount: i64,
    max_stack: i64,
) -> Result<GameResult<i64>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row: Option<(i64,)> =
        sqlx::query_as("SELECT stack FROM seats WHERE table_id = ? AND user_id = ?")
            .bind(table_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some((stack,)) = row else {
        return Ok(Err(GameError::NotSeated));
    };
    if stack + amount > max_stack {
        return Ok(Err(GameError::RebuyExceedsMax { max: max_stack }));
    }

    if let Err(e) =
        wallet::debit_tx(&mut tx, user_id, amount, ledger_kind::REBUY, Some(table_id)).await?
    {
        return Ok(Err(e));
    }

    sqlx::query("UPDATE seats SET stack = stack + ? WHERE table_id = ? AND user_id = ?")
        .bind(amount)
        .bind(table_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(Ok(stack + amount))
}

pub async fn set_sitting_out(
    pool: &DbPool,
    table_id: &str,
    user_id: &str,
    sitting_out: bool,
) -> Result<GameResult<()>, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE seats SET is_sitting_out = ? WHERE table_id = ? AND user_id = ?",
    )
    .bind(sitting_out)
    .bind(table_id)
    .bind(user_id)
    .execute(pool)
    .await?;
    if updated.rows_affected() == 0 {
        return Ok(Err(GameError::NotSeated));
    }
    Ok(Ok(()))
}

/// Marks the given seats as in the hand and the table as running, in one
/// transaction with the blind-adjusted stacks.
pub async fn begin_hand_tx(
    pool: &DbPool,
    table_id: &str,
    stacks: &[(usize, i64)],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE tables SET status = 'RUNNING' WHERE id = ?")
        .bind(table_id)
        .execute(&mut *tx)
        .await?;
    for (seat_no, stack) in stacks {
        sqlx::query(
            "UPDATE seats SET status = 'PLAYING', stack = ? WHERE table_id = ? AND seat_no = ?",
        )
        .bind(stack)
        .bind(table_id)
        .bind(*seat_no as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Writes every seat stack of a table in one transaction; called after each
/// applied action so the relational view never drifts more than one action
/// behind the runtime.
pub async fn persist_stacks(
    pool: &DbPool,
    table_id: &str,
    stacks: &[(usize, i64)],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for (seat_no, stack) in stacks {
        write_stack_tx(&mut tx, table_id, *seat_no, *stack).await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn write_stack_tx(
    tx: &mut SqliteConnection,
    table_id: &str,
    seat_no: usize,
    stack: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE seats SET stack = ? WHERE table_id = ? AND seat_no = ?")
        .bind(stack)
        .bind(table_id)
        .bind(seat_no as i64)
        .execute(tx)
        .await?;
    Ok(())
}

/// Returns the table to its between-hands state: status WAITING, all seats
/// back to SEATED.
pub async fn end_hand_tx(pool: &DbPool, table_id: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE tables SET status = 'WAITING' WHERE id = ?")
        .bind(table_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE seats SET status = 'SEATED' WHERE table_id = ?")
        .bind(table_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (DbPool, TableRow) {
        let pool = crate::create_test_db().await;
        for (id, name) in [("u1", "alice"), ("u2", "bob")] {
            sqlx::query(
                "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, 'x', 'now')",
            )
            .bind(id)
            .bind(name)
            .execute(&pool)
            .await
            .unwrap();
            wallet::create_wallet(&pool, id, 10_000).await.unwrap();
        }
        let table = TableRow::new("Test Table".to_string(), 5, 10, 6);
        create_table(&pool, &table).await.unwrap();
        (pool, table)
    }

    #[tokio::test]
    async fn test_take_seat_debits_wallet() {
        let (pool, table) = setup().await;
        take_seat(&pool, &table.id, 1, "u1", 1000)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(wallet::balance(&pool, "u1").await.unwrap(), Some(9000));
        let seats = seats_for_table(&pool, &table.id).await.unwrap();
        assert_eq!(seats.len(), 1);
        assert_eq!(seats[0].seat_no, 1);
        assert_eq!(seats[0].stack, 1000);
        assert_eq!(seats[0].username, "alice");
    }

    #[tokio::test]
    async fn test_taken_seat_is_refused_without_charge() {
        let (pool, table) = setup().await;
        take_seat(&pool, &table.id, 1, "u1", 1000)
            .await
            .unwrap()
            .unwrap();

        let result = take_seat(&pool, &table.id, 1, "u2", 1000).await.unwrap();
        assert_eq!(result, Err(GameError::SeatTaken { seat_no: 1 }));
        assert_eq!(wallet::balance(&pool, "u2").await.unwrap(), Some(10_000));
    }

    #[tokio::test]
    async fn test_release_seat_credits_stack() {
        let (pool, table) = setup().await;
        take_seat(&pool, &table.id, 1, "u1", 1000)
            .await
            .unwrap()
            .unwrap();

        let cashed = release_seat(&pool, &table.id, "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cashed, 1000);
        assert_eq!(wallet::balance(&pool, "u1").await.unwrap(), Some(10_000));
        assert!(seats_for_table(&pool, &table.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuy_is_capped() {
        let (pool, table) = setup().await;
        take_seat(&pool, &table.id, 1, "u1", 900).await.unwrap().unwrap();

        let result = rebuy(&pool, &table.id, "u1", 200, 1000).await.unwrap();
        assert_eq!(result, Err(GameError::RebuyExceedsMax { max: 1000 }));

        let new_stack = rebuy(&pool, &table.id, "u1", 100, 1000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new_stack, 1000);
        assert_eq!(wallet::balance(&pool, "u1").await.unwrap(), Some(9000));
    }

    #[tokio::test]
    async fn test_persist_stacks_updates_all_seats() {
        let (pool, table) = setup().await;
        take_seat(&pool, &table.id, 1, "u1", 1000).await.unwrap().unwrap();
        take_seat(&pool, &table.id, 2, "u2", 1000).await.unwrap().unwrap();

        persist_stacks(&pool, &table.id, &[(1, 985), (2, 1015)])
            .await
            .unwrap();

        let seats = seats_for_table(&pool, &table.id).await.unwrap();
        assert_eq!(seats[0].stack, 985);
        assert_eq!(seats[1].stack, 1015);
    }
}
