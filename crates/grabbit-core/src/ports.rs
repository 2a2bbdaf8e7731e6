//! Ports implemented by adapters.
//!
//! Storage lives in `grabbit-db`, the chat capability behind `ChatConnector`
//! is provided by whatever session layer the binary wires in, and the event
//! emitter is implemented by the web surface. Components receive these as
//! `Arc<dyn ...>` from the composition root; there are no global singletons.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::ChatConfig;
use crate::error::{ChatError, StorageError};
use crate::job::{Job, JobPage, JobQuery, NewJob, ProgressPatch, StatsSnapshot};
use crate::routing::{NewSourceRoute, SourceRoute, SourceRoutePatch};

/// Durable CRUD over job records.
///
/// Every update operation is a single atomic UPDATE over the row, keyed by
/// `external_id`, and touches `updated_at`. Operations on missing rows are
/// no-ops reported as `Ok(false)`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, new: NewJob) -> Result<Job, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<Job>, StorageError>;

    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<Job>, StorageError>;

    async fn list(&self, query: JobQuery) -> Result<JobPage, StorageError>;

    /// Write the progress field group together.
    async fn update_progress(
        &self,
        external_id: &str,
        patch: ProgressPatch,
    ) -> Result<bool, StorageError>;

    /// Terminal success: `status=done, progress=100, speed=0, pending_time=0`;
    /// when the total is known both byte counters are set to it.
    async fn mark_done(
        &self,
        external_id: &str,
        total_bytes: Option<u64>,
    ) -> Result<bool, StorageError>;

    /// Terminal failure: `status=failed, speed=0, pending_time=NULL` plus the
    /// error text.
    async fn mark_failed(&self, external_id: &str, error: &str) -> Result<bool, StorageError>;

    /// Operator cancellation: `status=stopped, speed=0`.
    async fn mark_stopped(&self, external_id: &str) -> Result<bool, StorageError>;

    /// Retry transition back to `downloading`; clears the error and, for chat
    /// jobs, resets progress.
    async fn mark_downloading(
        &self,
        external_id: &str,
        reset_progress: bool,
    ) -> Result<bool, StorageError>;

    /// Record a per-attempt error without changing status.
    async fn record_error(&self, external_id: &str, error: &str) -> Result<bool, StorageError>;

    /// Update the filename once the extractor discovers the real title.
    async fn set_file(&self, external_id: &str, file: &str) -> Result<bool, StorageError>;

    /// Flag that the on-disk artifact no longer exists.
    async fn mark_file_deleted(&self, external_id: &str) -> Result<bool, StorageError>;

    /// Soft delete; the row stays for audit but leaves all default reads.
    async fn soft_delete(&self, external_id: &str) -> Result<bool, StorageError>;

    /// Aggregate counters over all non-deleted jobs.
    async fn stats(&self) -> Result<StatsSnapshot, StorageError>;
}

/// CRUD over source routing entries.
#[async_trait]
pub trait RoutingStore: Send + Sync {
    async fn list(&self) -> Result<Vec<SourceRoute>, StorageError>;

    async fn get(&self, id: i64) -> Result<Option<SourceRoute>, StorageError>;

    async fn get_by_tag(&self, source_tag: &str) -> Result<Option<SourceRoute>, StorageError>;

    async fn create(&self, new: NewSourceRoute) -> Result<SourceRoute, StorageError>;

    async fn update(&self, id: i64, patch: SourceRoutePatch)
    -> Result<Option<SourceRoute>, StorageError>;

    async fn delete(&self, id: i64) -> Result<bool, StorageError>;

    /// Tags flagged access-restricted (hidden from default listings).
    async fn restricted_tags(&self) -> Result<HashSet<String>, StorageError>;

    /// Resolve routing-entry ids to their source tags (for listing exclusion).
    async fn tags_for_ids(&self, ids: &[i64]) -> Result<HashSet<String>, StorageError>;
}

/// An operator account.
#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Operator credential storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Seed the default account when the table is empty.
    async fn seed_default(&self, username: &str, password: &str) -> Result<(), StorageError>;

    /// Verify credentials; `None` on unknown user or wrong password.
    async fn verify(&self, username: &str, password: &str) -> Result<Option<User>, StorageError>;

    /// Change a password after verifying the current one.
    /// `Ok(false)` means the current password did not match.
    async fn change_password(
        &self,
        user_id: i64,
        current: &str,
        new: &str,
    ) -> Result<bool, StorageError>;
}

/// Key/value settings storage.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Progress callback signature used by the chat capability: `(current, total)`
/// in bytes. Called from the capability's transfer loop.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Handle onto the media of one inbound chat message.
///
/// `post_reply`/`edit_reply` drive the optional side-channel status mirror;
/// both are best-effort and must never poison the download.
#[async_trait]
pub trait MediaHandle: Send + Sync {
    /// Download the media to `path`, reporting progress through the callback.
    async fn download_to(&self, path: &Path, progress: ProgressFn<'_>) -> Result<(), ChatError>;

    /// Post a status reply next to the original message. Returns a handle to
    /// edit later, or `None` if the provider refused.
    async fn post_reply(&self, text: &str) -> Result<Option<i64>, ChatError>;

    /// Edit a previously posted status reply.
    async fn edit_reply(&self, reply_id: i64, text: &str) -> Result<(), ChatError>;
}

/// One inbound file-bearing message from the chat account.
pub struct InboundFile {
    /// Provider message id; becomes the job's `external_id` as text.
    pub message_id: i64,
    /// Suggested filename from the message, if any.
    pub suggested_name: Option<String>,
    pub mime_type: Option<String>,
    pub media: Arc<dyn MediaHandle>,
}

/// The session capability: given valid credentials, yields the stream of
/// inbound file-bearing messages on the target channel.
///
/// The handshake itself (auth codes, session persistence) lives outside the
/// core; the binary decides which connector, if any, to wire in.
#[async_trait]
pub trait ChatConnector: Send + Sync {
    async fn connect(&self, config: &ChatConfig)
    -> Result<mpsc::Receiver<InboundFile>, ChatError>;
}
