//! SQLite implementation of the `UserStore` port.
//!
//! Passwords are stored as salted argon2 hashes. Hash verification runs on a
//! blocking thread; argon2 is deliberately slow.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::password_hash::rand_core::OsRng;
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use grabbit_core::{StorageError, User, UserStore};

use super::map_sqlx;

/// SQLite implementation of the `UserStore` port.
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_user).transpose()
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn seed_default(&self, username: &str, password: &str) -> Result<(), StorageError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?
            .try_get("n")
            .map_err(map_sqlx)?;
        if count > 0 {
            return Ok(());
        }

        let hash = hash_password(password)?;
        sqlx::query("INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(username)
            .bind(&hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        tracing::info!(username, "seeded default operator account; change the password");
        Ok(())
    }

    async fn verify(&self, username: &str, password: &str) -> Result<Option<User>, StorageError> {
        let Some(user) = self.get_by_username(username).await? else {
            return Ok(None);
        };
        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn change_password(
        &self,
        user_id: i64,
        current: &str,
        new: &str,
    ) -> Result<bool, StorageError> {
        let Some(user) = self.get_by_id(user_id).await? else {
            return Ok(false);
        };
        if !verify_password(current, &user.password_hash)? {
            return Ok(false);
        }

        let hash = hash_password(new)?;
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(&hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(true)
    }
}

fn hash_password(password: &str) -> Result<String, StorageError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| StorageError::Backend(format!("password hash: {e}")))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, StorageError> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| StorageError::Backend(format!("stored hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Convert a database row to a `User`.
fn row_to_user(row: &SqliteRow) -> Result<User, StorageError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx)?;
    let username: String = row.try_get("username").map_err(map_sqlx)?;
    let password_hash: String = row.try_get("password_hash").map_err(map_sqlx)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx)?;
    Ok(User {
        id,
        username,
        password_hash,
        created_at,
    })
}
