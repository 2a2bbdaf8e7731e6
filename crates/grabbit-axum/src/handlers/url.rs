//! URL probe and download endpoints.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use grabbit_core::Job;
use grabbit_download::{ProbeInfo, StartRequest};

use crate::auth::AuthUser;
use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub url: String,
}

/// Probe result; an unsupported or failing URL is a `supported: false`
/// answer, not an HTTP error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CheckResponse {
    Supported {
        supported: bool,
        #[serde(flatten)]
        info: ProbeInfo,
    },
    Unsupported {
        supported: bool,
        error: String,
    },
}

/// `POST /api/url/check`
pub async fn check(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, HttpError> {
    if req.url.is_empty() {
        return Err(HttpError::BadRequest("URL is required".to_string()));
    }

    match state.url_intake.probe(&req.url).await {
        Ok(info) => Ok(Json(CheckResponse::Supported {
            supported: true,
            info,
        })),
        Err(e) => Ok(Json(CheckResponse::Unsupported {
            supported: false,
            error: e.to_string(),
        })),
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub resolution: Option<String>,
}

/// `POST /api/url/download`
pub async fn download(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<Job>, HttpError> {
    if req.url.is_empty() {
        return Err(HttpError::BadRequest("URL is required".to_string()));
    }

    let job = state
        .url_intake
        .start(StartRequest {
            url: req.url,
            format_id: req.format_id,
            title: req.title,
            ext: req.ext,
            filesize: req.filesize,
            resolution: req.resolution,
        })
        .await?;

    Ok(Json(job))
}
