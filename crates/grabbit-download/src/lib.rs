//! Download engine: one supervisor task per active job.
//!
//! Two kinds of workers share one model: the chat worker drives the chat
//! capability's callback-based transfer, the URL worker supervises one
//! extractor subprocess. Both own their job's durable record while running,
//! publish throttled progress plus unthrottled status events, and honor a
//! cooperative cancellation token. The shared registry guarantees at most
//! one worker per `external_id`.

pub mod chat;
pub mod progress;
pub mod registry;
pub mod url;

use std::sync::Arc;

use grabbit_core::{JobEvent, JobEventEmitter, JobStore};

pub use chat::{ChatIntake, ChatWorkerConfig};
pub use registry::{RegistryGuard, WorkerRegistry};
pub use url::{
    ExtractError, Extractor, ProbeFormat, ProbeInfo, SpawnSpec, StartRequest, UrlIntake, YtDlp,
};

/// Emit a fresh stats snapshot, coalesced with `new`/`status` events.
///
/// Best-effort: a storage fault here is logged, never propagated.
pub async fn emit_stats(store: &Arc<dyn JobStore>, events: &Arc<dyn JobEventEmitter>) {
    match store.stats().await {
        Ok(stats) => events.emit(JobEvent::Stats { stats }),
        Err(e) => tracing::warn!(error = %e, "failed to compute stats snapshot"),
    }
}
