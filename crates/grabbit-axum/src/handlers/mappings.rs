//! Source routing CRUD.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use grabbit_core::{NewSourceRoute, SourceRoute, SourceRoutePatch};

use crate::auth::AuthUser;
use crate::error::HttpError;
use crate::state::AppState;

/// `GET /api/mappings`
pub async fn list(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
) -> Result<Json<Vec<SourceRoute>>, HttpError> {
    Ok(Json(state.routing.list().await?))
}

/// `POST /api/mappings`
pub async fn create(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(new): Json<NewSourceRoute>,
) -> Result<Json<SourceRoute>, HttpError> {
    if new.source_tag.is_empty() {
        return Err(HttpError::BadRequest("source_tag is required".to_string()));
    }
    Ok(Json(state.routing.create(new).await?))
}

/// `PUT /api/mappings/{id}`
pub async fn update(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<i64>,
    Json(patch): Json<SourceRoutePatch>,
) -> Result<Json<SourceRoute>, HttpError> {
    state
        .routing
        .update(id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| HttpError::NotFound(format!("mapping {id}")))
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// `DELETE /api/mappings/{id}`
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, HttpError> {
    let deleted = state.routing.delete(id).await?;
    if !deleted {
        return Err(HttpError::NotFound(format!("mapping {id}")));
    }
    Ok(Json(DeletedResponse { deleted }))
}
