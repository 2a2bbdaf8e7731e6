//! The job model - one record per logical download.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Currently being downloaded (also the initial status).
    Downloading,
    /// Completed successfully.
    Done,
    /// Failed after exhausting retries or a non-resumable error.
    Failed,
    /// Stopped by the operator.
    Stopped,
}

impl JobStatus {
    /// Convert to string representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "done" => Self::Done,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            // "downloading" or unknown values default to Downloading
            _ => Self::Downloading,
        }
    }

    /// Whether this status is terminal (`done`, `failed` or `stopped`).
    ///
    /// Every terminal status is resumable back to `downloading` via retry.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading)
    }

    /// Whether a retry is valid from this status.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }
}

/// The origin of a job.
///
/// The wire contract discriminates by shape of the `external_id`: URL jobs
/// carry a generated UUID (always contains a hyphen), chat jobs carry the
/// decimal message id. Internally the kind is an explicit tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Inbound file message from the chat account.
    Chat,
    /// Operator-submitted URL handled by the site extractor.
    Url,
}

impl JobKind {
    /// Classify an `external_id` by the legacy wire rule: a hyphen means UUID.
    #[must_use]
    pub fn from_external_id(external_id: &str) -> Self {
        if external_id.contains('-') {
            Self::Url
        } else {
            Self::Chat
        }
    }
}

/// A download job.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    /// Internal primary key.
    pub id: i64,
    /// Stable operator-visible handle; always a string on the wire.
    pub external_id: String,
    /// Normalized origin label (`chat` or a host label like `youtube`).
    pub source_tag: String,
    /// Original URL; `None` for chat jobs.
    pub url: Option<String>,
    /// Current filename (may change once the extractor reports the title).
    pub file: String,
    pub status: JobStatus,
    /// Percentage in [0, 100], one decimal.
    pub progress: f64,
    /// Current throughput estimate in KiB/s.
    pub speed: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// Estimated remaining seconds.
    pub pending_time: Option<f64>,
    /// Last error message.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    /// Set when a later probe finds the on-disk artifact gone.
    #[serde(default)]
    pub file_deleted: bool,
}

impl Job {
    /// The kind of this job, derived from its identity.
    #[must_use]
    pub fn kind(&self) -> JobKind {
        if self.url.is_some() {
            JobKind::Url
        } else {
            JobKind::from_external_id(&self.external_id)
        }
    }
}

/// Fields for inserting a new job. Status starts as `downloading`.
#[derive(Clone, Debug)]
pub struct NewJob {
    pub external_id: String,
    pub source_tag: String,
    pub url: Option<String>,
    pub file: String,
    /// Known up front for URL jobs when the probe reported a size.
    pub total_bytes: u64,
}

/// Progress fields, always written together so observers never see a torn
/// update (`downloaded_bytes > total_bytes` from interleaving).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressPatch {
    pub progress: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed: f64,
    pub pending_time: Option<f64>,
}

/// Listing status filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    All,
    /// Everything that is not `done`.
    Active,
}

impl StatusFilter {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "active" { Self::Active } else { Self::All }
    }
}

/// Sortable columns for the listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    File,
    Status,
    Progress,
}

impl SortField {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "file" => Self::File,
            "status" => Self::Status,
            "progress" => Self::Progress,
            _ => Self::CreatedAt,
        }
    }

    /// Column name, used to build the ORDER BY clause from a fixed whitelist.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::File => "file",
            Self::Status => "status",
            Self::Progress => "progress",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s == "asc" { Self::Asc } else { Self::Desc }
    }

    #[must_use]
    pub const fn sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query parameters for the listing operation.
///
/// Filters apply in order: source-tag exclusion, filename substring,
/// status filter, sort, then offset/limit.
#[derive(Clone, Debug, Default)]
pub struct JobQuery {
    /// Case-insensitive substring match on the filename.
    pub search: Option<String>,
    pub filter: StatusFilter,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub limit: Option<u32>,
    pub offset: u32,
    /// Source tags to exclude (already resolved from routing-entry ids).
    pub exclude_sources: Vec<String>,
}

/// One page of listing results.
#[derive(Clone, Debug, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    /// Count before pagination.
    pub total: u64,
    pub has_more: bool,
}

/// Aggregate counters over all non-deleted jobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_count: u64,
    /// Jobs whose status is not `done`.
    pub active_count: u64,
    pub downloaded_count: u64,
    pub total_downloaded: u64,
    pub total_size: u64,
    /// `total_size - total_downloaded`, floored at zero.
    pub pending_bytes: u64,
    /// Sum of current speeds in KiB/s.
    pub total_speed: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Downloading,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Stopped,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_defaults_to_downloading() {
        assert_eq!(JobStatus::parse("queued"), JobStatus::Downloading);
        assert_eq!(JobStatus::parse(""), JobStatus::Downloading);
    }

    #[test]
    fn terminal_statuses_are_retryable_except_done() {
        assert!(JobStatus::Failed.is_retryable());
        assert!(JobStatus::Stopped.is_retryable());
        assert!(!JobStatus::Done.is_retryable());
        assert!(!JobStatus::Downloading.is_retryable());
        assert!(JobStatus::Done.is_terminal());
        assert!(!JobStatus::Downloading.is_terminal());
    }

    #[test]
    fn kind_discrimination_follows_hyphen_rule() {
        assert_eq!(
            JobKind::from_external_id("9b2e8a54-1f7c-4f7e-bb6a-0d6a2f1c9e11"),
            JobKind::Url
        );
        assert_eq!(JobKind::from_external_id("12345"), JobKind::Chat);
    }

    #[test]
    fn sort_field_columns_are_whitelisted() {
        assert_eq!(SortField::parse("file").column(), "file");
        assert_eq!(SortField::parse("progress").column(), "progress");
        // Anything unrecognized falls back to created_at
        assert_eq!(SortField::parse("; DROP TABLE").column(), "created_at");
    }
}
