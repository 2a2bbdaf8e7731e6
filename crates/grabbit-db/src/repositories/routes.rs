//! SQLite implementation of the `RoutingStore` port.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use grabbit_core::{NewSourceRoute, RoutingStore, SourceRoute, SourceRoutePatch, StorageError};

use super::map_sqlx;

/// SQLite implementation of the `RoutingStore` port.
pub struct SqliteRoutingStore {
    pool: SqlitePool,
}

impl SqliteRoutingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoutingStore for SqliteRoutingStore {
    async fn list(&self) -> Result<Vec<SourceRoute>, StorageError> {
        let rows = sqlx::query("SELECT * FROM download_type_maps ORDER BY source_tag ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(row_to_route).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<SourceRoute>, StorageError> {
        let row = sqlx::query("SELECT * FROM download_type_maps WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_route).transpose()
    }

    async fn get_by_tag(&self, source_tag: &str) -> Result<Option<SourceRoute>, StorageError> {
        let row = sqlx::query("SELECT * FROM download_type_maps WHERE source_tag = ?")
            .bind(source_tag)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_route).transpose()
    }

    async fn create(&self, new: NewSourceRoute) -> Result<SourceRoute, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO download_type_maps (source_tag, access_restricted, folder, quality, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.source_tag)
        .bind(new.access_restricted)
        .bind(&new.folder)
        .bind(&new.quality)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("mapping {id} after insert")))
    }

    async fn update(
        &self,
        id: i64,
        patch: SourceRoutePatch,
    ) -> Result<Option<SourceRoute>, StorageError> {
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };

        let source_tag = patch.source_tag.unwrap_or(current.source_tag);
        let access_restricted = patch.access_restricted.unwrap_or(current.access_restricted);
        let folder = patch.folder.unwrap_or(current.folder);
        let quality = patch.quality.unwrap_or(current.quality);

        sqlx::query(
            r#"
            UPDATE download_type_maps
            SET source_tag = ?, access_restricted = ?, folder = ?, quality = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&source_tag)
        .bind(access_restricted)
        .bind(&folder)
        .bind(&quality)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        self.get(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM download_type_maps WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn restricted_tags(&self) -> Result<HashSet<String>, StorageError> {
        let rows =
            sqlx::query("SELECT source_tag FROM download_type_maps WHERE access_restricted = 1")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("source_tag").map_err(map_sqlx))
            .collect()
    }

    async fn tags_for_ids(&self, ids: &[i64]) -> Result<HashSet<String>, StorageError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql =
            format!("SELECT source_tag FROM download_type_maps WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx)?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("source_tag").map_err(map_sqlx))
            .collect()
    }
}

/// Convert a database row to a `SourceRoute`.
fn row_to_route(row: &SqliteRow) -> Result<SourceRoute, StorageError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx)?;
    let source_tag: String = row.try_get("source_tag").map_err(map_sqlx)?;
    let access_restricted: bool = row.try_get("access_restricted").map_err(map_sqlx)?;
    let folder: Option<String> = row.try_get("folder").map_err(map_sqlx)?;
    let quality: Option<String> = row.try_get("quality").map_err(map_sqlx)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map_sqlx)?;

    Ok(SourceRoute {
        id,
        source_tag,
        access_restricted,
        folder,
        quality,
        created_at,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;

    async fn store() -> SqliteRoutingStore {
        SqliteRoutingStore::new(setup_test_database().await.unwrap())
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let store = store().await;
        let route = store
            .create(NewSourceRoute {
                source_tag: "youtube".into(),
                access_restricted: false,
                folder: Some("/mnt/media/yt".into()),
                quality: Some("720p".into()),
            })
            .await
            .unwrap();

        let by_tag = store.get_by_tag("youtube").await.unwrap().unwrap();
        assert_eq!(by_tag.id, route.id);
        assert_eq!(by_tag.quality.as_deref(), Some("720p"));
    }

    #[tokio::test]
    async fn duplicate_tag_is_a_constraint_error() {
        let store = store().await;
        let new = NewSourceRoute {
            source_tag: "vimeo".into(),
            access_restricted: false,
            folder: None,
            quality: None,
        };
        store.create(new.clone()).await.unwrap();
        let err = store.create(new).await.unwrap_err();
        assert!(matches!(err, StorageError::Constraint(_)));
    }

    #[tokio::test]
    async fn sparse_update_keeps_unset_fields() {
        let store = store().await;
        let route = store
            .create(NewSourceRoute {
                source_tag: "x".into(),
                access_restricted: false,
                folder: Some("/a".into()),
                quality: Some("1080p".into()),
            })
            .await
            .unwrap();

        let updated = store
            .update(
                route.id,
                SourceRoutePatch {
                    access_restricted: Some(true),
                    folder: Some(None),
                    ..SourceRoutePatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.access_restricted);
        assert_eq!(updated.folder, None);
        assert_eq!(updated.quality.as_deref(), Some("1080p"));
    }

    #[tokio::test]
    async fn restricted_tags_and_id_resolution() {
        let store = store().await;
        let restricted = store
            .create(NewSourceRoute {
                source_tag: "adult-site".into(),
                access_restricted: true,
                folder: None,
                quality: None,
            })
            .await
            .unwrap();
        store
            .create(NewSourceRoute {
                source_tag: "youtube".into(),
                access_restricted: false,
                folder: None,
                quality: None,
            })
            .await
            .unwrap();

        let tags = store.restricted_tags().await.unwrap();
        assert!(tags.contains("adult-site"));
        assert!(!tags.contains("youtube"));

        let resolved = store.tags_for_ids(&[restricted.id]).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved.contains("adult-site"));
        assert!(store.tags_for_ids(&[]).await.unwrap().is_empty());
    }
}
