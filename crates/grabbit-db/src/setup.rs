//! Database setup and forward-only migrations.
//!
//! `setup_database()` opens (or creates) the SQLite file, creates all tables
//! with `IF NOT EXISTS`, then brings older databases forward by introspecting
//! the live schema and adding any missing columns with safe defaults.
//! Migrations only ever add; nothing is renamed or dropped.

use anyhow::Result;
use sqlx::{Row, SqlitePool, sqlite::SqliteConnectOptions};
use std::path::Path;

/// Sets up the SQLite database connection and ensures the schema exists.
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true),
    )
    .await?;

    create_schema(&pool).await?;
    migrate(&pool).await?;

    Ok(pool)
}

/// Sets up an in-memory SQLite database for testing, with the full
/// production schema.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    let pool = SqlitePool::connect("sqlite::memory:").await?;
    create_schema(&pool).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Creates the complete database schema.
///
/// Safe to call repeatedly; every statement uses IF NOT EXISTS.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS downloads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL,
            file TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'downloading',
            progress REAL NOT NULL DEFAULT 0,
            speed REAL NOT NULL DEFAULT 0,
            error TEXT,
            updated_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            downloaded_bytes INTEGER NOT NULL DEFAULT 0,
            total_bytes INTEGER NOT NULL DEFAULT 0,
            pending_time REAL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            source_tag TEXT NOT NULL DEFAULT 'chat',
            url TEXT,
            file_deleted INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // external_id is collision-free by construction but not unique-constrained
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_downloads_external_id ON downloads(external_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_downloads_status ON downloads(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS download_type_maps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_tag TEXT NOT NULL UNIQUE,
            access_restricted INTEGER NOT NULL DEFAULT 0,
            folder TEXT,
            quality TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Bring older databases forward.
///
/// Columns added after the first release are detected by introspection and
/// added with defaults that keep existing rows meaningful.
async fn migrate(pool: &SqlitePool) -> Result<()> {
    add_column_if_missing(pool, "downloads", "is_deleted", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column_if_missing(pool, "downloads", "source_tag", "TEXT NOT NULL DEFAULT 'chat'").await?;
    add_column_if_missing(pool, "downloads", "url", "TEXT").await?;
    add_column_if_missing(pool, "downloads", "file_deleted", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column_if_missing(pool, "downloads", "pending_time", "REAL").await?;
    Ok(())
}

/// Check whether a column exists via PRAGMA introspection.
async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let rows = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().any(|row| {
        row.try_get::<String, _>("name")
            .is_ok_and(|name| name == column)
    }))
}

/// Forward-only `ADD COLUMN` migration step.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    if column_exists(pool, table, column).await? {
        return Ok(());
    }
    tracing::info!(table, column, "adding missing column");
    sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_test_database() {
        let pool = setup_test_database().await.unwrap();

        // Verify tables exist by querying them
        let _: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM downloads")
            .fetch_one(&pool)
            .await
            .unwrap();
        let _: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM download_type_maps")
            .fetch_one(&pool)
            .await
            .unwrap();
        let _: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        let _: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn migration_adds_missing_columns() {
        // Simulate a database from before source routing and soft delete
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL,
                file TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'downloading',
                progress REAL NOT NULL DEFAULT 0,
                speed REAL NOT NULL DEFAULT 0,
                error TEXT,
                updated_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                downloaded_bytes INTEGER NOT NULL DEFAULT 0,
                total_bytes INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        assert!(!column_exists(&pool, "downloads", "is_deleted").await.unwrap());

        create_schema(&pool).await.unwrap();
        migrate(&pool).await.unwrap();

        for column in ["is_deleted", "source_tag", "url", "file_deleted", "pending_time"] {
            assert!(
                column_exists(&pool, "downloads", column).await.unwrap(),
                "missing column {column} after migration"
            );
        }

        // Existing rows pick up the safe defaults
        sqlx::query(
            "INSERT INTO downloads (external_id, file, updated_at, created_at) VALUES ('1', 'f', '2024', '2024')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let row = sqlx::query("SELECT is_deleted, source_tag FROM downloads")
            .fetch_one(&pool)
            .await
            .unwrap();
        let deleted: i64 = row.try_get("is_deleted").unwrap();
        let tag: String = row.try_get("source_tag").unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(tag, "chat");
    }
}
