//! Listing, stats and the job lifecycle commands (retry, stop, delete).

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use grabbit_core::{
    JobEvent, JobEventEmitter, JobKind, JobPage, JobQuery, JobStatus, SortField, SortOrder,
    StatsSnapshot, StatusFilter,
};
use grabbit_download::emit_stats;

use crate::auth::AuthUser;
use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    /// CSV of routing-entry ids whose source tags are excluded.
    #[serde(default)]
    pub exclude_mapping_ids: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub downloads: Vec<grabbit_core::Job>,
    pub total: u64,
    pub has_more: bool,
}

/// `GET /api/downloads`
pub async fn list(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, HttpError> {
    let mapping_ids: Vec<i64> = params
        .exclude_mapping_ids
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();
    // Access-restricted sources are hidden from every listing; caller-supplied
    // mapping ids add to that set
    let mut excluded = state.routing.restricted_tags().await?;
    excluded.extend(state.routing.tags_for_ids(&mapping_ids).await?);
    let exclude_sources = excluded.into_iter().collect();

    let JobPage {
        jobs,
        total,
        has_more,
    } = state
        .store
        .list(JobQuery {
            search: params.search,
            filter: params
                .filter
                .as_deref()
                .map(StatusFilter::parse)
                .unwrap_or_default(),
            sort_by: params
                .sort_by
                .as_deref()
                .map(SortField::parse)
                .unwrap_or_default(),
            sort_order: params
                .sort_order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default(),
            limit: params.limit,
            offset: params.offset.unwrap_or(0),
            exclude_sources,
        })
        .await?;

    Ok(Json(ListResponse {
        downloads: jobs,
        total,
        has_more,
    }))
}

/// `GET /api/stats`
pub async fn stats(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<Json<StatsSnapshot>, HttpError> {
    Ok(Json(state.store.stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// `POST /api/retry`
///
/// Valid only for failed or stopped jobs. URL jobs resume from the partial
/// artifact with their progress intact; chat jobs restart from zero (there
/// is no stored message handle to re-fetch, the operator re-sends).
pub async fn retry(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<RetryRequest>,
) -> Result<Json<StatusResponse>, HttpError> {
    let job = state
        .store
        .get(req.id)
        .await?
        .ok_or_else(|| HttpError::NotFound(format!("download {}", req.id)))?;

    if !job.status.is_retryable() {
        return Err(HttpError::Conflict(
            "only failed or stopped downloads can be retried".to_string(),
        ));
    }

    match job.kind() {
        JobKind::Url => {
            state.store.mark_downloading(&job.external_id, false).await?;
            state
                .events
                .emit(JobEvent::status(&job.external_id, JobStatus::Downloading));
            emit_stats(&state.store, &state.emitter()).await;
            state.url_intake.resume(&job).await?;
        }
        JobKind::Chat => {
            if !state.chat_config().is_complete() {
                return Err(HttpError::Conflict(
                    "chat provider not configured".to_string(),
                ));
            }
            state.store.mark_downloading(&job.external_id, true).await?;
            state
                .events
                .emit(JobEvent::status(&job.external_id, JobStatus::Downloading));
            emit_stats(&state.store, &state.emitter()).await;
        }
    }

    Ok(Json(StatusResponse { status: "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ExternalIdRequest {
    pub external_id: String,
}

/// `POST /api/stop`
///
/// Idempotent: stopping a job with no running worker still answers success
/// and leaves the job stopped.
pub async fn stop(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<ExternalIdRequest>,
) -> Result<Json<StatusResponse>, HttpError> {
    state.registry.cancel(&req.external_id);

    // The worker's cancellation path writes the same terminal state; writing
    // it here too covers workers that are already gone
    state.store.mark_stopped(&req.external_id).await?;
    state
        .events
        .emit(JobEvent::status(&req.external_id, JobStatus::Stopped));
    emit_stats(&state.store, &state.emitter()).await;

    Ok(Json(StatusResponse { status: "stopped" }))
}

/// `POST /api/delete`
///
/// Cancels any running worker, then soft-deletes; the row stays for audit.
/// Idempotent after the first call.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<ExternalIdRequest>,
) -> Result<Json<StatusResponse>, HttpError> {
    state.registry.cancel(&req.external_id);

    state.store.soft_delete(&req.external_id).await?;
    state.events.emit(JobEvent::Deleted {
        external_id: req.external_id.clone(),
    });
    emit_stats(&state.store, &state.emitter()).await;

    Ok(Json(StatusResponse { status: "deleted" }))
}
