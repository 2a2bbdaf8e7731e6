//! The worker registry: one entry per in-flight job.
//!
//! A single map keyed by `external_id` replaces per-source bookkeeping; the
//! kind tag records which worker owns the entry. Intakes insert at job start,
//! workers remove through a guard on every exit path, and the control surface
//! reads to cancel. Invariant: at most one entry (and one worker) per
//! `external_id` at any time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use grabbit_core::JobKind;

/// State held for one in-flight job.
#[derive(Clone)]
pub struct WorkerEntry {
    pub kind: JobKind,
    pub cancel: CancellationToken,
}

/// Shared registry of in-flight workers.
///
/// Uses a std mutex: every critical section is a few map operations, and the
/// drop guard must be able to remove entries outside an async context.
#[derive(Default)]
pub struct WorkerRegistry {
    inner: Mutex<HashMap<String, WorkerEntry>>,
}

impl WorkerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker for `external_id`.
    ///
    /// Returns `None` when a worker already owns the id (the caller must not
    /// start a second one); otherwise returns the guard that removes the
    /// entry when dropped.
    pub fn register(
        self: &Arc<Self>,
        external_id: &str,
        kind: JobKind,
        cancel: CancellationToken,
    ) -> Option<RegistryGuard> {
        let mut inner = self.inner.lock().expect("registry poisoned");
        if inner.contains_key(external_id) {
            return None;
        }
        inner.insert(external_id.to_string(), WorkerEntry { kind, cancel });
        Some(RegistryGuard {
            registry: Arc::clone(self),
            external_id: external_id.to_string(),
        })
    }

    /// Look up the entry for a job.
    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<WorkerEntry> {
        self.inner
            .lock()
            .expect("registry poisoned")
            .get(external_id)
            .cloned()
    }

    /// Fire the cancellation token of a job's worker, if one is running.
    /// Returns whether a worker was found.
    pub fn cancel(&self, external_id: &str) -> bool {
        match self.get(external_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight worker (shutdown path).
    pub fn cancel_all(&self) -> usize {
        let inner = self.inner.lock().expect("registry poisoned");
        for entry in inner.values() {
            entry.cancel.cancel();
        }
        inner.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, external_id: &str) {
        self.inner.lock().expect("registry poisoned").remove(external_id);
    }
}

/// Removes the registry entry when dropped, so a worker leaving through any
/// path (completion, failure, cancellation, panic unwind) releases its id.
pub struct RegistryGuard {
    registry: Arc<WorkerRegistry>,
    external_id: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.external_id);
    }
}
