//! SQLite implementation of the `SettingsStore` port.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use grabbit_core::{SettingsStore, StorageError};

use super::map_sqlx;

/// SQLite implementation of the `SettingsStore` port.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
}

impl SqliteSettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| r.try_get::<Option<String>, _>("value").map_err(map_sqlx))
            .transpose()
            .map(Option::flatten)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;

    #[tokio::test]
    async fn set_then_get_then_overwrite() {
        let store = SqliteSettingsStore::new(setup_test_database().await.unwrap());

        assert_eq!(store.get("jwt_secret").await.unwrap(), None);

        store.set("jwt_secret", "first").await.unwrap();
        assert_eq!(store.get("jwt_secret").await.unwrap().as_deref(), Some("first"));

        store.set("jwt_secret", "second").await.unwrap();
        assert_eq!(store.get("jwt_secret").await.unwrap().as_deref(), Some("second"));
    }
}
