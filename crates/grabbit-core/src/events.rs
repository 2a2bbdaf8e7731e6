//! Job events - discriminated union for everything observers see.
//!
//! The web surface forwards these verbatim to connected clients, so the
//! payload shapes are a wire contract. `external_id` is always a string:
//! chat message ids do not survive a round-trip through clients that cannot
//! carry 64-bit integers losslessly.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus, StatsSnapshot};

/// Progress payload shared by the event and the worker pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub external_id: String,
    pub progress: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// KiB/s.
    pub speed: f64,
    pub pending_time: Option<f64>,
}

/// Single discriminated union for all job events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was created. Carries the full record.
    New {
        job: Job,
    },

    /// Throttled progress update (at most one per second per job, but the
    /// final 100% is always delivered).
    Progress {
        #[serde(flatten)]
        progress: ProgressPayload,
    },

    /// A status transition. Unthrottled.
    Status {
        external_id: String,
        status: JobStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A job was soft-deleted.
    Deleted {
        external_id: String,
    },

    /// Aggregate counters, coalesced with `new`/`status` emissions.
    Stats {
        stats: StatsSnapshot,
    },
}

impl JobEvent {
    /// Create a status event without error text.
    #[must_use]
    pub fn status(external_id: impl Into<String>, status: JobStatus) -> Self {
        Self::Status {
            external_id: external_id.into(),
            status,
            error: None,
        }
    }

    /// Create a status event carrying error text.
    #[must_use]
    pub fn status_with_error(
        external_id: impl Into<String>,
        status: JobStatus,
        error: impl Into<String>,
    ) -> Self {
        Self::Status {
            external_id: external_id.into(),
            status,
            error: Some(error.into()),
        }
    }
}

/// Port for emitting job events to whoever is listening.
///
/// Implementations must be cheap and non-blocking: workers call this inline.
/// Emitting to nobody is fine.
pub trait JobEventEmitter: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Emitter that drops everything. Used in tests and headless runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl JobEventEmitter for NoopEmitter {
    fn emit(&self, _event: JobEvent) {}
}
