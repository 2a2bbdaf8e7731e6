//! SQLite implementation of the `JobStore` port.
//!
//! Soft-deleted rows are excluded from every read unless stated otherwise.
//! Each update is one UPDATE statement, so the progress field group is always
//! written together and concurrent writers serialize at the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use grabbit_core::{
    Job, JobPage, JobQuery, JobStatus, JobStore, NewJob, ProgressPatch, StatsSnapshot,
    StatusFilter, StorageError,
};

use super::map_sqlx;

/// SQLite implementation of the `JobStore` port.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Hard delete, reserved for administrative cleanup. Not routed.
    pub async fn purge(&self, id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert(&self, new: NewJob) -> Result<Job, StorageError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO downloads (
                external_id, file, status, progress, speed, error,
                updated_at, created_at, downloaded_bytes, total_bytes,
                pending_time, is_deleted, source_tag, url, file_deleted
            ) VALUES (?, ?, 'downloading', 0, 0, NULL, ?, ?, 0, ?, NULL, 0, ?, ?, 0)
            "#,
        )
        .bind(&new.external_id)
        .bind(&new.file)
        .bind(now)
        .bind(now)
        .bind(i64::try_from(new.total_bytes).unwrap_or(i64::MAX))
        .bind(&new.source_tag)
        .bind(&new.url)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("download {id} after insert")))
    }

    async fn get(&self, id: i64) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query("SELECT * FROM downloads WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Job>, StorageError> {
        let row = sqlx::query("SELECT * FROM downloads WHERE external_id = ? AND is_deleted = 0")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(&self, query: JobQuery) -> Result<JobPage, StorageError> {
        // Filters apply in a fixed order: source exclusion, filename search,
        // status filter. Sort columns come from a whitelist.
        let mut where_sql = String::from("is_deleted = 0");
        if !query.exclude_sources.is_empty() {
            let placeholders = vec!["?"; query.exclude_sources.len()].join(", ");
            where_sql.push_str(&format!(" AND source_tag NOT IN ({placeholders})"));
        }
        if query.search.as_deref().is_some_and(|s| !s.is_empty()) {
            // SQLite LIKE is case-insensitive for ASCII
            where_sql.push_str(" AND file LIKE ? ESCAPE '\\'");
        }
        if query.filter == StatusFilter::Active {
            where_sql.push_str(" AND status != 'done'");
        }

        let search_pattern = query
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", like_escape(s)));

        // Count before pagination
        let count_sql = format!("SELECT COUNT(*) AS n FROM downloads WHERE {where_sql}");
        let mut count_query = sqlx::query(&count_sql);
        for tag in &query.exclude_sources {
            count_query = count_query.bind(tag);
        }
        if let Some(pattern) = &search_pattern {
            count_query = count_query.bind(pattern);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?
            .try_get("n")
            .map_err(map_sqlx)?;

        let order = format!(
            "ORDER BY {} {}",
            query.sort_by.column(),
            query.sort_order.sql()
        );
        let limit = query.limit.map_or(-1_i64, i64::from);
        let rows_sql =
            format!("SELECT * FROM downloads WHERE {where_sql} {order} LIMIT ? OFFSET ?");
        let mut rows_query = sqlx::query(&rows_sql);
        for tag in &query.exclude_sources {
            rows_query = rows_query.bind(tag);
        }
        if let Some(pattern) = &search_pattern {
            rows_query = rows_query.bind(pattern);
        }
        rows_query = rows_query.bind(limit).bind(i64::from(query.offset));

        let rows = rows_query.fetch_all(&self.pool).await.map_err(map_sqlx)?;
        let jobs: Vec<Job> = rows.iter().map(row_to_job).collect::<Result<_, _>>()?;

        let total = u64::try_from(total).unwrap_or(0);
        let has_more = u64::from(query.offset) + (jobs.len() as u64) < total;

        Ok(JobPage {
            jobs,
            total,
            has_more,
        })
    }

    async fn update_progress(
        &self,
        external_id: &str,
        patch: ProgressPatch,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET progress = ?, downloaded_bytes = ?, total_bytes = ?,
                speed = ?, pending_time = ?, updated_at = ?
            WHERE external_id = ? AND is_deleted = 0
            "#,
        )
        .bind(patch.progress)
        .bind(i64::try_from(patch.downloaded_bytes).unwrap_or(i64::MAX))
        .bind(i64::try_from(patch.total_bytes).unwrap_or(i64::MAX))
        .bind(patch.speed)
        .bind(patch.pending_time)
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_done(
        &self,
        external_id: &str,
        total_bytes: Option<u64>,
    ) -> Result<bool, StorageError> {
        // progress = 100 and status = done land in the same UPDATE
        let result = match total_bytes {
            Some(total) => {
                let total = i64::try_from(total).unwrap_or(i64::MAX);
                sqlx::query(
                    r#"
                    UPDATE downloads
                    SET status = 'done', progress = 100, speed = 0, pending_time = 0,
                        downloaded_bytes = ?, total_bytes = ?, error = NULL, updated_at = ?
                    WHERE external_id = ? AND is_deleted = 0
                    "#,
                )
                .bind(total)
                .bind(total)
                .bind(Utc::now())
                .bind(external_id)
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE downloads
                    SET status = 'done', progress = 100, speed = 0, pending_time = 0,
                        downloaded_bytes = total_bytes, error = NULL, updated_at = ?
                    WHERE external_id = ? AND is_deleted = 0
                    "#,
                )
                .bind(Utc::now())
                .bind(external_id)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, external_id: &str, error: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = 'failed', speed = 0, pending_time = NULL, error = ?, updated_at = ?
            WHERE external_id = ? AND is_deleted = 0
            "#,
        )
        .bind(error)
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_stopped(&self, external_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE downloads
            SET status = 'stopped', speed = 0, updated_at = ?
            WHERE external_id = ? AND is_deleted = 0
            "#,
        )
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_downloading(
        &self,
        external_id: &str,
        reset_progress: bool,
    ) -> Result<bool, StorageError> {
        let sql = if reset_progress {
            r#"
            UPDATE downloads
            SET status = 'downloading', progress = 0, downloaded_bytes = 0,
                speed = 0, pending_time = NULL, error = NULL, updated_at = ?
            WHERE external_id = ? AND is_deleted = 0
            "#
        } else {
            r#"
            UPDATE downloads
            SET status = 'downloading', speed = 0, error = NULL, updated_at = ?
            WHERE external_id = ? AND is_deleted = 0
            "#
        };
        let result = sqlx::query(sql)
            .bind(Utc::now())
            .bind(external_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_error(&self, external_id: &str, error: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE downloads SET error = ?, updated_at = ? WHERE external_id = ? AND is_deleted = 0",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_file(&self, external_id: &str, file: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE downloads SET file = ?, updated_at = ? WHERE external_id = ? AND is_deleted = 0",
        )
        .bind(file)
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_file_deleted(&self, external_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE downloads SET file_deleted = 1, updated_at = ? WHERE external_id = ? AND is_deleted = 0",
        )
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, external_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE downloads SET is_deleted = 1, updated_at = ? WHERE external_id = ? AND is_deleted = 0",
        )
        .bind(Utc::now())
        .bind(external_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<StatsSnapshot, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_count,
                COALESCE(SUM(CASE WHEN status != 'done' THEN 1 ELSE 0 END), 0) AS active_count,
                COALESCE(SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END), 0) AS downloaded_count,
                COALESCE(SUM(downloaded_bytes), 0) AS total_downloaded,
                COALESCE(SUM(total_bytes), 0) AS total_size,
                COALESCE(SUM(speed), 0.0) AS total_speed
            FROM downloads
            WHERE is_deleted = 0
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let total_downloaded: i64 = row.try_get("total_downloaded").map_err(map_sqlx)?;
        let total_size: i64 = row.try_get("total_size").map_err(map_sqlx)?;
        let total_count: i64 = row.try_get("total_count").map_err(map_sqlx)?;
        let active_count: i64 = row.try_get("active_count").map_err(map_sqlx)?;
        let downloaded_count: i64 = row.try_get("downloaded_count").map_err(map_sqlx)?;
        let total_speed: f64 = row.try_get("total_speed").map_err(map_sqlx)?;

        let total_downloaded = u64::try_from(total_downloaded).unwrap_or(0);
        let total_size = u64::try_from(total_size).unwrap_or(0);

        Ok(StatsSnapshot {
            total_count: u64::try_from(total_count).unwrap_or(0),
            active_count: u64::try_from(active_count).unwrap_or(0),
            downloaded_count: u64::try_from(downloaded_count).unwrap_or(0),
            total_downloaded,
            total_size,
            pending_bytes: total_size.saturating_sub(total_downloaded),
            total_speed,
        })
    }
}

/// Escape LIKE metacharacters in a user-supplied search string.
fn like_escape(s: &str) -> String {
    s.replace('\\', r"\\").replace('%', r"\%").replace('_', r"\_")
}

/// Convert a database row to a `Job`.
fn row_to_job(row: &SqliteRow) -> Result<Job, StorageError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx)?;
    let external_id: String = row.try_get("external_id").map_err(map_sqlx)?;
    let source_tag: String = row.try_get("source_tag").map_err(map_sqlx)?;
    let url: Option<String> = row.try_get("url").map_err(map_sqlx)?;
    let file: String = row.try_get("file").map_err(map_sqlx)?;
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    let progress: f64 = row.try_get("progress").map_err(map_sqlx)?;
    let speed: f64 = row.try_get("speed").map_err(map_sqlx)?;
    let downloaded_bytes: i64 = row.try_get("downloaded_bytes").map_err(map_sqlx)?;
    let total_bytes: i64 = row.try_get("total_bytes").map_err(map_sqlx)?;
    let pending_time: Option<f64> = row.try_get("pending_time").map_err(map_sqlx)?;
    let error: Option<String> = row.try_get("error").map_err(map_sqlx)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_sqlx)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map_sqlx)?;
    let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx)?;
    let file_deleted: bool = row.try_get("file_deleted").map_err(map_sqlx)?;

    Ok(Job {
        id,
        external_id,
        source_tag,
        url,
        file,
        status: JobStatus::parse(&status),
        progress,
        speed,
        downloaded_bytes: u64::try_from(downloaded_bytes).unwrap_or(0),
        total_bytes: u64::try_from(total_bytes).unwrap_or(0),
        pending_time,
        error,
        created_at,
        updated_at,
        is_deleted,
        file_deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use grabbit_core::{SortField, SortOrder};

    async fn store() -> SqliteJobStore {
        SqliteJobStore::new(setup_test_database().await.unwrap())
    }

    fn chat_job(message_id: i64, file: &str) -> NewJob {
        NewJob {
            external_id: message_id.to_string(),
            source_tag: "chat".into(),
            url: None,
            file: file.into(),
            total_bytes: 0,
        }
    }

    fn url_job(external_id: &str, source_tag: &str, file: &str) -> NewJob {
        NewJob {
            external_id: external_id.into(),
            source_tag: source_tag.into(),
            url: Some(format!("https://{source_tag}.com/v/x")),
            file: file.into(),
            total_bytes: 1000,
        }
    }

    #[tokio::test]
    async fn insert_then_find_by_both_keys() {
        let store = store().await;
        let job = store.insert(chat_job(12345, "movie.mp4")).await.unwrap();

        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.external_id, "12345");
        assert!((job.progress - 0.0).abs() < f64::EPSILON);

        let by_id = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(by_id.external_id, "12345");
        let by_eid = store.get_by_external_id("12345").await.unwrap().unwrap();
        assert_eq!(by_eid.id, job.id);
    }

    #[tokio::test]
    async fn progress_fields_are_written_together() {
        let store = store().await;
        store.insert(chat_job(1, "a.bin")).await.unwrap();

        let updated = store
            .update_progress(
                "1",
                ProgressPatch {
                    progress: 42.5,
                    downloaded_bytes: 425,
                    total_bytes: 1000,
                    speed: 128.0,
                    pending_time: Some(4.5),
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let job = store.get_by_external_id("1").await.unwrap().unwrap();
        assert!((job.progress - 42.5).abs() < f64::EPSILON);
        assert_eq!(job.downloaded_bytes, 425);
        assert_eq!(job.total_bytes, 1000);
        assert_eq!(job.pending_time, Some(4.5));
    }

    #[tokio::test]
    async fn missing_row_updates_are_noops() {
        let store = store().await;
        assert!(!store.mark_done("nope", None).await.unwrap());
        assert!(!store.mark_stopped("nope").await.unwrap());
        assert!(!store.soft_delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn done_sets_progress_speed_and_bytes_atomically() {
        let store = store().await;
        store.insert(url_job("u-1", "youtube", "clip.mp4")).await.unwrap();
        store
            .update_progress(
                "u-1",
                ProgressPatch {
                    progress: 50.0,
                    downloaded_bytes: 500,
                    total_bytes: 1000,
                    speed: 99.0,
                    pending_time: Some(3.0),
                },
            )
            .await
            .unwrap();

        store.mark_done("u-1", Some(52_428_800)).await.unwrap();
        let job = store.get_by_external_id("u-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert!((job.progress - 100.0).abs() < f64::EPSILON);
        assert!((job.speed - 0.0).abs() < f64::EPSILON);
        assert_eq!(job.downloaded_bytes, 52_428_800);
        assert_eq!(job.total_bytes, 52_428_800);
        assert_eq!(job.pending_time, Some(0.0));
    }

    #[tokio::test]
    async fn done_without_total_mirrors_existing_total() {
        let store = store().await;
        store.insert(url_job("u-2", "vimeo", "v.mp4")).await.unwrap();
        store.mark_done("u-2", None).await.unwrap();
        let job = store.get_by_external_id("u-2").await.unwrap().unwrap();
        assert_eq!(job.downloaded_bytes, job.total_bytes);
        assert_eq!(job.total_bytes, 1000);
    }

    #[tokio::test]
    async fn failed_clears_speed_and_records_error() {
        let store = store().await;
        store.insert(chat_job(9, "x.bin")).await.unwrap();
        store.mark_failed("9", "attempt 6/6 failed: timeout").await.unwrap();

        let job = store.get_by_external_id("9").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!((job.speed - 0.0).abs() < f64::EPSILON);
        assert_eq!(job.pending_time, None);
        assert_eq!(job.error.as_deref(), Some("attempt 6/6 failed: timeout"));
    }

    #[tokio::test]
    async fn retry_preserves_or_resets_progress() {
        let store = store().await;
        store.insert(url_job("u-3", "youtube", "c.mp4")).await.unwrap();
        store
            .update_progress(
                "u-3",
                ProgressPatch {
                    progress: 10.0,
                    downloaded_bytes: 100,
                    total_bytes: 1000,
                    speed: 50.0,
                    pending_time: Some(10.0),
                },
            )
            .await
            .unwrap();
        store.mark_stopped("u-3").await.unwrap();

        // URL retry keeps progress (the extractor resumes from the partial file)
        store.mark_downloading("u-3", false).await.unwrap();
        let job = store.get_by_external_id("u-3").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Downloading);
        assert!((job.progress - 10.0).abs() < f64::EPSILON);
        assert!(job.error.is_none());

        // Chat retry resets
        store.insert(chat_job(7, "d.bin")).await.unwrap();
        store
            .update_progress(
                "7",
                ProgressPatch {
                    progress: 60.0,
                    downloaded_bytes: 600,
                    total_bytes: 1000,
                    speed: 10.0,
                    pending_time: None,
                },
            )
            .await
            .unwrap();
        store.mark_failed("7", "boom").await.unwrap();
        store.mark_downloading("7", true).await.unwrap();
        let job = store.get_by_external_id("7").await.unwrap().unwrap();
        assert!((job.progress - 0.0).abs() < f64::EPSILON);
        assert_eq!(job.downloaded_bytes, 0);
    }

    #[tokio::test]
    async fn soft_delete_hides_from_all_reads() {
        let store = store().await;
        let job = store.insert(chat_job(55, "gone.bin")).await.unwrap();

        assert!(store.soft_delete("55").await.unwrap());
        assert!(store.get(job.id).await.unwrap().is_none());
        assert!(store.get_by_external_id("55").await.unwrap().is_none());

        let page = store.list(JobQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);

        // Idempotent: the second call is a no-op on an already-deleted row
        assert!(!store.soft_delete("55").await.unwrap());
    }

    #[tokio::test]
    async fn list_filters_in_order_and_paginates() {
        let store = store().await;
        store.insert(url_job("a-1", "youtube", "Alpha.mp4")).await.unwrap();
        store.insert(url_job("b-2", "adult-site", "Beta.mp4")).await.unwrap();
        store.insert(chat_job(3, "alpha notes.txt")).await.unwrap();
        store.mark_done("a-1", None).await.unwrap();

        // Exclusion by source tag
        let page = store
            .list(JobQuery {
                exclude_sources: vec!["adult-site".into()],
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.jobs.iter().all(|j| j.source_tag != "adult-site"));

        // Case-insensitive substring search
        let page = store
            .list(JobQuery {
                search: Some("ALPHA".into()),
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        // Active filter drops done rows
        let page = store
            .list(JobQuery {
                filter: StatusFilter::Active,
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert!(page.jobs.iter().all(|j| j.status != JobStatus::Done));

        // Sort by file ascending
        let page = store
            .list(JobQuery {
                sort_by: SortField::File,
                sort_order: SortOrder::Asc,
                ..JobQuery::default()
            })
            .await
            .unwrap();
        let files: Vec<&str> = page.jobs.iter().map(|j| j.file.as_str()).collect();
        assert_eq!(files, vec!["Alpha.mp4", "Beta.mp4", "alpha notes.txt"]);

        // Pagination reports pre-pagination total and has_more
        let page = store
            .list(JobQuery {
                limit: Some(2),
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 2);
        assert_eq!(page.total, 3);
        assert!(page.has_more);

        let page = store
            .list(JobQuery {
                limit: Some(2),
                offset: 2,
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn purge_removes_the_row_for_good() {
        let store = store().await;
        let job = store.insert(chat_job(11, "tmp.bin")).await.unwrap();
        store.soft_delete("11").await.unwrap();

        assert!(store.purge(job.id).await.unwrap());
        assert!(!store.purge(job.id).await.unwrap());

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM downloads")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .try_get("n")
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn stats_aggregate_over_non_deleted() {
        let store = store().await;
        store.insert(url_job("s-1", "youtube", "a.mp4")).await.unwrap();
        store.insert(url_job("s-2", "youtube", "b.mp4")).await.unwrap();
        store
            .update_progress(
                "s-1",
                ProgressPatch {
                    progress: 50.0,
                    downloaded_bytes: 500,
                    total_bytes: 1000,
                    speed: 100.0,
                    pending_time: None,
                },
            )
            .await
            .unwrap();
        store.mark_done("s-2", Some(1000)).await.unwrap();
        store.insert(chat_job(99, "c.bin")).await.unwrap();
        store.soft_delete("99").await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.active_count, 1);
        assert_eq!(stats.downloaded_count, 1);
        assert_eq!(stats.total_downloaded, 1500);
        assert_eq!(stats.total_size, 2000);
        assert_eq!(stats.pending_bytes, 500);
        assert!((stats.total_speed - 100.0).abs() < f64::EPSILON);
    }
}
