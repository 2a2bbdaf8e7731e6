//! Source routing: per-source destination folders, quality preference and
//! access gating.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag used for all chat jobs.
pub const CHAT_SOURCE_TAG: &str = "chat";

/// Coarse media classification driving the default destination folder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Videos,
    Images,
    Documents,
}

impl MediaKind {
    /// Classify by MIME type: `image/*` and `video/*` get their own folders,
    /// everything else lands in Documents.
    #[must_use]
    pub fn from_mime(mime: Option<&str>) -> Self {
        match mime {
            Some(m) if m.starts_with("image/") => Self::Images,
            Some(m) if m.starts_with("video/") => Self::Videos,
            _ => Self::Documents,
        }
    }

    /// Default subfolder name under the download directory.
    #[must_use]
    pub const fn folder_name(&self) -> &'static str {
        match self {
            Self::Videos => "Videos",
            Self::Images => "Images",
            Self::Documents => "Documents",
        }
    }
}

/// One routing entry, keyed by source tag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceRoute {
    pub id: i64,
    pub source_tag: String,
    /// When set, jobs from this source are hidden from the default listing.
    pub access_restricted: bool,
    /// Custom destination folder; falls back to the media-kind default when
    /// absent or inaccessible.
    pub folder: Option<String>,
    /// Preferred quality label, e.g. `720p`.
    pub quality: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating a routing entry.
#[derive(Clone, Debug, Deserialize)]
pub struct NewSourceRoute {
    pub source_tag: String,
    #[serde(default)]
    pub access_restricted: bool,
    pub folder: Option<String>,
    pub quality: Option<String>,
}

/// Sparse update for a routing entry.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SourceRoutePatch {
    pub source_tag: Option<String>,
    pub access_restricted: Option<bool>,
    pub folder: Option<Option<String>>,
    pub quality: Option<Option<String>>,
}

/// Derive the source tag from a URL: strip a leading `www.` and take the
/// registrable label, so `www.youtube.com` → `youtube` and
/// `media.example.co.uk` → `example`.
#[must_use]
pub fn source_tag_from_url(raw: &str) -> String {
    let Some(host) = url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
    else {
        return "unknown".to_string();
    };

    let host = host.strip_prefix("www.").unwrap_or(&host);
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        let second_level = parts[parts.len() - 2];
        if parts.len() >= 3 && matches!(second_level, "co" | "com" | "org" | "net") {
            return parts[parts.len() - 3].to_string();
        }
        return second_level.to_string();
    }
    host.to_string()
}

/// Resolve the destination folder for a job.
///
/// Prefers the routing entry's folder when it is usable (the folder or its
/// parent exists and the folder can be created); otherwise falls back to the
/// default directory for the media kind. Accessibility is re-checked per job,
/// so a transiently lost mount degrades to the default instead of failing
/// the job.
#[must_use]
pub fn resolve_destination(
    route: Option<&SourceRoute>,
    kind: MediaKind,
    download_dir: &Path,
) -> PathBuf {
    if let Some(folder) = route.and_then(|r| r.folder.as_deref()) {
        let custom = PathBuf::from(folder);
        let reachable = custom.exists() || custom.parent().is_some_and(Path::exists);
        if reachable && std::fs::create_dir_all(&custom).is_ok() {
            return custom;
        }
        tracing::warn!(
            folder = %custom.display(),
            fallback = kind.folder_name(),
            "custom destination folder not accessible, using default"
        );
    }

    download_dir.join(kind.folder_name())
}

/// Pick a format id given the probed formats and an optional preferred
/// quality.
///
/// The preferred quality matches case-insensitively as a substring of the
/// rendered height label (`720` matches `720p60`). Without a match the
/// highest-height format wins; without any formats the extractor's `best`
/// selector is used.
#[must_use]
pub fn select_format_id<'a, I>(formats: I, preferred: Option<&str>) -> String
where
    I: IntoIterator<Item = (&'a str, Option<u32>)> + Clone,
{
    if let Some(pref) = preferred {
        let digits: String = pref.chars().filter(char::is_ascii_digit).collect();
        if !digits.is_empty() {
            let wanted = pref.to_ascii_lowercase();
            for (id, height) in formats.clone() {
                if let Some(h) = height {
                    let label = format!("{h}p");
                    if label.contains(&digits) || wanted.contains(&label) {
                        return id.to_string();
                    }
                }
            }
        }
    }

    formats
        .into_iter()
        .filter(|(_, h)| h.is_some())
        .max_by_key(|(_, h)| h.unwrap_or(0))
        .map_or_else(|| "best".to_string(), |(id, _)| id.to_string())
}
