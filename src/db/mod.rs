pub mod models;
pub mod tables;
pub mod wallet;

use sqlx::{sqlite::SqlitePool, Pool, Sqlite};
use std::path::Path;

pub type DbPool = Pool<Sqlite>;

pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    // Create the database file if it doesn't exist
    if let Some(db_path) = database_url.strip_prefix("sqlite:") {
        if db_path != ":memory:" && !Path::new(db_path).exists() {
            if let Some(parent) = Path::new(db_path).parent() {
                std::fs::create_dir_all(parent).ok();
            }
            std::fs::File::create(db_path).ok();
        }
    }

    SqlitePool::connect(database_url).await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _sqlx_migrations (
            version BIGINT PRIMARY KEY,
            description TEXT NOT NULL,
            installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            success BOOLEAN NOT NULL,
            execution_time BIGINT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // List of migrations: (version, name, sql)
    let migrations: Vec<(i64, &str, &str)> = vec![(
        1,
        "initial_schema",
        include_str!("migrations/001_initial_schema.sql"),
    )];

    for (version, name, sql) in migrations {
        let already_run = sqlx::query("SELECT 1 FROM _sqlx_migrations WHERE version = ?")
            .bind(version)
            .fetch_optional(pool)
            .await?
            .is_some();

        if already_run {
            tracing::debug!("Migration {} ({}) already applied", version, name);
            continue;
        }

        tracing::info!("Running migration {} ({})", version, name);
        let start_time = std::time::Instant::now();

        match execute_migration_sql(pool, sql).await {
            Ok(_) => {
                let elapsed = start_time.elapsed().as_millis() as i64;
                sqlx::query(
                    "INSERT INTO _sqlx_migrations (version, description, success, execution_time)
                     VALUES (?, ?, TRUE, ?)",
                )
                .bind(version)
                .bind(name)
                .bind(elapsed)
                .execute(pool)
                .await?;

                tracing::info!("Migration {} ({}) completed in {}ms", version, name, elapsed);
            }
            Err(e) => {
                let elapsed = start_time.elapsed().as_millis() as i64;
                let _ = sqlx::query(
                    "INSERT INTO _sqlx_migrations (version, description, success, execution_time)
                     VALUES (?, ?, FALSE, ?)",
                )
                .bind(version)
                .bind(name)
                .bind(elapsed)
                .execute(pool)
                .await;

                tracing::error!("Migration {} ({}) failed: {}", version, name, e);
                return Err(e);
            }
        }
    }

    Ok(())
}

async fn execute_migration_sql(pool: &DbPool, sql: &str) -> Result<(), sqlx::Error> {
    // Split by semicolon and execute each statement
    let statements: Vec<&str> = sql
        .split(';')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    for statement in statements.iter() {
        let non_comment_lines: Vec<&str> = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--") && !line.trim().is_empty())
            .collect();

        if non_comment_lines.is_empty() {
            continue;
        }

        let clean_statement = non_comment_lines.join("\n");
        sqlx::query(&clean_statement).execute(pool).await?;
    }

    Ok(())
}
