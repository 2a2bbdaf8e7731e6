//! On-disk artifact checks and byte-range media streaming.
//!
//! The stream endpoint honors `Range: bytes=a-b` with 206 responses so media
//! elements can seek; the bearer token may arrive as a `token` query
//! parameter because those elements cannot set headers.

use std::path::PathBuf;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Response;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

use grabbit_core::routing::MediaKind;
use grabbit_core::Job;

use crate::auth::AuthUser;
use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct FileCheckResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// `GET /api/video/check/{id}`
///
/// Probes the artifact on disk; a missing file is flagged on the job.
pub async fn check(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<FileCheckResponse>, HttpError> {
    let job = fetch_job(&state, id).await?;

    match locate_artifact(&state, &job).await {
        Some(path) => {
            let size = tokio::fs::metadata(&path).await.ok().map(|m| m.len());
            Ok(Json(FileCheckResponse { exists: true, size }))
        }
        None => {
            state.store.mark_file_deleted(&job.external_id).await?;
            Ok(Json(FileCheckResponse {
                exists: false,
                size: None,
            }))
        }
    }
}

/// `GET /api/video/stream/{id}`
pub async fn stream(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let job = fetch_job(&state, id).await?;
    let Some(path) = locate_artifact(&state, &job).await else {
        state.store.mark_file_deleted(&job.external_id).await?;
        return Err(HttpError::NotFound(format!("file for download {id}")));
    };

    let total = tokio::fs::metadata(&path)
        .await
        .map_err(|e| HttpError::Internal(format!("stat failed: {e}")))?
        .len();
    let mime = mime_for(&path);

    // Non-bytes range units are ignored, not rejected
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|raw| raw.trim_start().starts_with("bytes="))
        .map(|raw| parse_range(raw, total));

    match range {
        None => {
            // Whole file
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| HttpError::Internal(format!("open failed: {e}")))?;
            let body = Body::from_stream(ReaderStream::new(file));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, total)
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .map_err(|e| HttpError::Internal(e.to_string()))
        }
        Some(Some((start, end))) => {
            let len = end - start + 1;
            let mut file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| HttpError::Internal(format!("open failed: {e}")))?;
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(|e| HttpError::Internal(format!("seek failed: {e}")))?;
            let body = Body::from_stream(ReaderStream::new(file.take(len)));
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, mime)
                .header(header::CONTENT_LENGTH, len)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)
                .map_err(|e| HttpError::Internal(e.to_string()))
        }
        Some(None) => {
            // Unsatisfiable range
            Response::builder()
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(header::CONTENT_RANGE, format!("bytes */{total}"))
                .body(Body::empty())
                .map_err(|e| HttpError::Internal(e.to_string()))
        }
    }
}

async fn fetch_job(state: &AppState, id: i64) -> Result<Job, HttpError> {
    state
        .store
        .get(id)
        .await?
        .ok_or_else(|| HttpError::NotFound(format!("download {id}")))
}

/// Find the artifact: the source's routed folder first, then each default
/// media folder, then the download root.
async fn locate_artifact(state: &AppState, job: &Job) -> Option<PathBuf> {
    let mut folders: Vec<PathBuf> = Vec::new();
    if let Ok(Some(route)) = state.routing.get_by_tag(&job.source_tag).await {
        if let Some(folder) = route.folder {
            folders.push(PathBuf::from(folder));
        }
    }
    for kind in [MediaKind::Videos, MediaKind::Images, MediaKind::Documents] {
        folders.push(state.config.download_dir.join(kind.folder_name()));
    }
    folders.push(state.config.download_dir.clone());

    for folder in folders {
        let candidate = folder.join(&job.file);
        if tokio::fs::metadata(&candidate)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Some(candidate);
        }
    }
    None
}

/// Parse a `bytes=` range against the file size.
///
/// `Some((start, end))` is a satisfiable inclusive range; `None` means 416.
fn parse_range(raw: &str, total: u64) -> Option<(u64, u64)> {
    let spec = raw.strip_prefix("bytes=")?.trim();
    let (start_raw, end_raw) = spec.split_once('-')?;

    if start_raw.is_empty() {
        // Suffix form: last n bytes
        let n: u64 = end_raw.parse().ok()?;
        if n == 0 || total == 0 {
            return None;
        }
        let start = total.saturating_sub(n);
        return Some((start, total - 1));
    }

    let start: u64 = start_raw.parse().ok()?;
    if start >= total {
        return None;
    }
    let end = if end_raw.is_empty() {
        total - 1
    } else {
        end_raw.parse::<u64>().ok()?.min(total - 1)
    };
    if end < start {
        return None;
    }
    Some((start, end))
}

fn mime_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("mp4" | "m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_range() {
        assert_eq!(parse_range("bytes=0-999", 1_000_000), Some((0, 999)));
        assert_eq!(parse_range("bytes=500-599", 1000), Some((500, 599)));
    }

    #[test]
    fn open_ended_and_suffix_ranges() {
        assert_eq!(parse_range("bytes=900-", 1000), Some((900, 999)));
        assert_eq!(parse_range("bytes=-100", 1000), Some((900, 999)));
        // End clamps to the file size
        assert_eq!(parse_range("bytes=0-5000", 1000), Some((0, 999)));
    }

    #[test]
    fn unsatisfiable_ranges() {
        assert_eq!(parse_range("bytes=1000-1001", 1000), None);
        assert_eq!(parse_range("bytes=5-2", 1000), None);
        assert_eq!(parse_range("bytes=-0", 1000), None);
        assert_eq!(parse_range("units=0-1", 1000), None);
    }

    #[test]
    fn mime_resolution() {
        assert_eq!(mime_for(std::path::Path::new("a.mp4")), "video/mp4");
        assert_eq!(mime_for(std::path::Path::new("a.MKV")), "video/x-matroska");
        assert_eq!(mime_for(std::path::Path::new("a.unknown")), "application/octet-stream");
    }
}
