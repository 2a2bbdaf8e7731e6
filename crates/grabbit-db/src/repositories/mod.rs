//! Repository implementations over the shared SQLite pool.

mod jobs;
mod routes;
mod settings;
mod users;

pub use jobs::SqliteJobStore;
pub use routes::SqliteRoutingStore;
pub use settings::SqliteSettingsStore;
pub use users::SqliteUserStore;

use grabbit_core::StorageError;

/// Map a sqlx error to the storage error taxonomy.
pub(crate) fn map_sqlx(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Constraint(db.message().to_string())
        }
        sqlx::Error::RowNotFound => StorageError::NotFound("row".to_string()),
        _ => StorageError::Backend(e.to_string()),
    }
}
