//! Chat intake and chat download worker.
//!
//! The intake subscribes to the chat capability's inbound file stream. Each
//! file-bearing message becomes a job plus one worker task that drives the
//! capability's callback-based transfer to disk with retries. An optional
//! side-channel status reply is posted next to the original message and
//! edited every twenty seconds; it is best-effort and never affects the
//! download itself.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use grabbit_core::routing::{self, CHAT_SOURCE_TAG, MediaKind};
use grabbit_core::sanitize::sanitize_filename;
use grabbit_core::{
    ChatConfig, ChatConnector, InboundFile, JobEvent, JobEventEmitter, JobKind, JobStatus,
    JobStore, MediaHandle, NewJob, ProgressPatch, RoutingStore,
};

use crate::emit_stats;
use crate::progress::ProgressTracker;
use crate::registry::WorkerRegistry;

/// Tunables for the chat worker. Tests shrink the delays.
#[derive(Clone, Debug)]
pub struct ChatWorkerConfig {
    /// Max download attempts per job.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Cadence of side-channel status edits.
    pub edit_interval: Duration,
}

impl Default for ChatWorkerConfig {
    fn default() -> Self {
        Self {
            max_retries: 6,
            retry_delay: Duration::from_secs(5),
            edit_interval: Duration::from_secs(20),
        }
    }
}

/// Subscribes to inbound chat files and launches one worker per message.
pub struct ChatIntake {
    store: Arc<dyn JobStore>,
    routing: Arc<dyn RoutingStore>,
    events: Arc<dyn JobEventEmitter>,
    registry: Arc<WorkerRegistry>,
    download_dir: PathBuf,
    worker_config: ChatWorkerConfig,
}

impl ChatIntake {
    pub fn new(
        store: Arc<dyn JobStore>,
        routing: Arc<dyn RoutingStore>,
        events: Arc<dyn JobEventEmitter>,
        registry: Arc<WorkerRegistry>,
        download_dir: PathBuf,
        worker_config: ChatWorkerConfig,
    ) -> Self {
        Self {
            store,
            routing,
            events,
            registry,
            download_dir,
            worker_config,
        }
    }

    /// Start consuming inbound files.
    ///
    /// Without complete credentials (or without a connector wired in) the
    /// intake stays quiescent and only logs how to proceed; the control
    /// surface keeps running either way.
    pub async fn start(
        self: &Arc<Self>,
        connector: Option<Arc<dyn ChatConnector>>,
        config: &ChatConfig,
    ) {
        if !config.is_complete() {
            tracing::warn!(
                "chat provider not configured; set provider_app_id, provider_app_hash and \
                 target_channel_id via the web UI or environment, then restart. \
                 URL downloads and the control surface remain available."
            );
            return;
        }
        let Some(connector) = connector else {
            tracing::warn!(
                "no chat session available; authenticate via the web UI and restart. \
                 URL downloads and the control surface remain available."
            );
            return;
        };

        match connector.connect(config).await {
            Ok(receiver) => {
                tracing::info!(channel = config.target_channel_id, "chat intake listening");
                let intake = Arc::clone(self);
                tokio::spawn(async move {
                    intake.run(receiver).await;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat session failed to start; intake quiescent");
            }
        }
    }

    /// Consume the inbound stream until the session ends.
    pub async fn run(self: Arc<Self>, mut receiver: mpsc::Receiver<InboundFile>) {
        while let Some(inbound) = receiver.recv().await {
            if let Err(e) = self.handle_inbound(inbound).await {
                tracing::error!(error = %e, "failed to start chat download");
            }
        }
        tracing::info!("chat intake stream ended");
    }

    async fn handle_inbound(&self, inbound: InboundFile) -> Result<(), grabbit_core::CoreError> {
        let external_id = inbound.message_id.to_string();
        let kind = MediaKind::from_mime(inbound.mime_type.as_deref());

        let route = self.routing.get_by_tag(CHAT_SOURCE_TAG).await.ok().flatten();
        let folder = routing::resolve_destination(route.as_ref(), kind, &self.download_dir);
        tokio::fs::create_dir_all(&folder).await?;

        let filename = sanitize_filename(
            &inbound
                .suggested_name
                .unwrap_or_else(|| Utc::now().format("%Y%m%d_%H%M%S").to_string()),
        );
        let path = folder.join(&filename);

        let job = self
            .store
            .insert(NewJob {
                external_id: external_id.clone(),
                source_tag: CHAT_SOURCE_TAG.to_string(),
                url: None,
                file: filename,
                total_bytes: 0,
            })
            .await?;

        tracing::info!(
            external_id = %external_id,
            file = %job.file,
            folder = %folder.display(),
            "chat download accepted"
        );
        self.events.emit(JobEvent::New { job });
        emit_stats(&self.store, &self.events).await;

        let cancel = CancellationToken::new();
        let Some(guard) = self
            .registry
            .register(&external_id, JobKind::Chat, cancel.clone())
        else {
            tracing::warn!(external_id = %external_id, "worker already running, not starting another");
            return Ok(());
        };

        let worker = ChatWorker {
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
            config: self.worker_config.clone(),
            external_id,
            path,
            media: inbound.media,
            cancel,
        };
        tokio::spawn(async move {
            let _guard = guard;
            worker.run().await;
        });

        Ok(())
    }
}

/// What one download attempt produced.
enum AttemptOutcome {
    Done { total_bytes: Option<u64> },
    Cancelled,
    Failed(String),
}

/// Drives one chat file to disk.
struct ChatWorker {
    store: Arc<dyn JobStore>,
    events: Arc<dyn JobEventEmitter>,
    config: ChatWorkerConfig,
    external_id: String,
    path: PathBuf,
    media: Arc<dyn MediaHandle>,
    cancel: CancellationToken,
}

impl ChatWorker {
    async fn run(self) {
        // Side-channel mirror, best-effort from the start
        let reply_id = match self.media.post_reply("Status: downloading").await {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(error = %e, "could not post status reply");
                None
            }
        };

        // Shared paths must not be silently overwritten
        if self.path.exists() {
            let error = format!("destination already exists: {}", self.path.display());
            tracing::warn!(external_id = %self.external_id, "{error}");
            self.store_failed(&error).await;
            self.edit_reply(reply_id, "Status: failed").await;
            return;
        }

        let mut last_error = String::from("download failed");
        for attempt in 1..=self.config.max_retries {
            match self.attempt(reply_id).await {
                AttemptOutcome::Done { total_bytes } => {
                    self.store_done(total_bytes).await;
                    self.edit_reply(reply_id, "Status: downloaded").await;
                    return;
                }
                AttemptOutcome::Cancelled => {
                    self.store_stopped().await;
                    self.edit_reply(reply_id, "Status: stopped").await;
                    return;
                }
                AttemptOutcome::Failed(e) => {
                    last_error =
                        format!("attempt {attempt}/{} failed: {e}", self.config.max_retries);
                    tracing::warn!(external_id = %self.external_id, "{last_error}");
                    if let Err(e) = self.store.record_error(&self.external_id, &last_error).await {
                        tracing::warn!(error = %e, "could not record attempt error");
                    }
                }
            }

            if attempt < self.config.max_retries {
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        self.store_stopped().await;
                        self.edit_reply(reply_id, "Status: stopped").await;
                        return;
                    }
                    () = tokio::time::sleep(self.config.retry_delay) => {}
                }
            }
        }

        self.store_failed(&last_error).await;
        self.edit_reply(reply_id, "Status: failed").await;
    }

    /// One attempt: await the capability's transfer while folding its
    /// progress callbacks into store updates and throttled events.
    async fn attempt(&self, reply_id: Option<i64>) -> AttemptOutcome {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u64, u64)>();
        let progress_fn = move |current: u64, total: u64| {
            let _ = tx.send((current, total));
        };

        let download = self.media.download_to(&self.path, &progress_fn);
        tokio::pin!(download);

        let mut tracker = ProgressTracker::new();
        let mut last_edit = Instant::now();
        let mut last_total: u64 = 0;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    return AttemptOutcome::Cancelled;
                }

                result = &mut download => {
                    return match result {
                        Ok(()) => AttemptOutcome::Done {
                            total_bytes: (last_total > 0).then_some(last_total),
                        },
                        Err(e) => AttemptOutcome::Failed(e.to_string()),
                    };
                }

                Some((current, total)) = rx.recv() => {
                    last_total = total;
                    let mut patch = tracker.sample(current, total);
                    // The terminal write owns 100%; a full-looking callback is
                    // still mid-flight until the transfer future resolves.
                    if patch.progress >= 100.0 {
                        patch.progress = 99.9;
                    }

                    if let Err(e) = self.store.update_progress(&self.external_id, patch).await {
                        tracing::warn!(error = %e, "progress write failed, continuing in memory");
                    }
                    if tracker.should_emit() {
                        self.emit_progress(&patch);
                    }
                    if reply_id.is_some() && last_edit.elapsed() >= self.config.edit_interval {
                        last_edit = Instant::now();
                        let text = format!(
                            "Status: downloading {:.1}% ({}/{})",
                            patch.progress,
                            human_size(patch.downloaded_bytes),
                            human_size(patch.total_bytes),
                        );
                        self.spawn_edit(reply_id, text);
                    }
                }
            }
        }
    }

    fn emit_progress(&self, patch: &ProgressPatch) {
        self.events.emit(JobEvent::Progress {
            progress: grabbit_core::ProgressPayload {
                external_id: self.external_id.clone(),
                progress: patch.progress,
                downloaded_bytes: patch.downloaded_bytes,
                total_bytes: patch.total_bytes,
                speed: patch.speed,
                pending_time: patch.pending_time,
            },
        });
    }

    async fn store_done(&self, total_bytes: Option<u64>) {
        match self.store.mark_done(&self.external_id, total_bytes).await {
            // Row soft-deleted underneath us: deleted was this job's last event
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => tracing::warn!(error = %e, "terminal write failed"),
        }
        let total = total_bytes.unwrap_or(0);
        self.events.emit(JobEvent::Progress {
            progress: grabbit_core::ProgressPayload {
                external_id: self.external_id.clone(),
                progress: 100.0,
                downloaded_bytes: total,
                total_bytes: total,
                speed: 0.0,
                pending_time: Some(0.0),
            },
        });
        self.events.emit(JobEvent::status(&self.external_id, JobStatus::Done));
        emit_stats(&self.store, &self.events).await;
        tracing::info!(external_id = %self.external_id, "chat download complete");
    }

    async fn store_stopped(&self) {
        match self.store.mark_stopped(&self.external_id).await {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => tracing::warn!(error = %e, "terminal write failed"),
        }
        self.events
            .emit(JobEvent::status(&self.external_id, JobStatus::Stopped));
        emit_stats(&self.store, &self.events).await;
        tracing::info!(external_id = %self.external_id, "chat download stopped");
    }

    async fn store_failed(&self, error: &str) {
        match self.store.mark_failed(&self.external_id, error).await {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => tracing::warn!(error = %e, "terminal write failed"),
        }
        self.events.emit(JobEvent::status_with_error(
            &self.external_id,
            JobStatus::Failed,
            error,
        ));
        emit_stats(&self.store, &self.events).await;
    }

    /// Fire-and-forget side-channel edit.
    fn spawn_edit(&self, reply_id: Option<i64>, text: String) {
        let Some(id) = reply_id else { return };
        let media = Arc::clone(&self.media);
        tokio::spawn(async move {
            if let Err(e) = media.edit_reply(id, &text).await {
                tracing::debug!(error = %e, "status reply edit failed");
            }
        });
    }

    async fn edit_reply(&self, reply_id: Option<i64>, text: &str) {
        let Some(id) = reply_id else { return };
        if let Err(e) = self.media.edit_reply(id, text).await {
            tracing::debug!(error = %e, "status reply edit failed");
        }
    }
}

fn human_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.1}{unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}PB")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use grabbit_core::{ChatError, JobStore, ProgressFn};
    use grabbit_db::{SqliteJobStore, SqliteRoutingStore, setup_test_database};
    use std::path::Path;
    use std::sync::Mutex;

    /// Collects every emitted event for ordering assertions.
    #[derive(Default)]
    struct CollectingEmitter {
        events: Mutex<Vec<JobEvent>>,
    }

    impl JobEventEmitter for CollectingEmitter {
        fn emit(&self, event: JobEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl CollectingEmitter {
        fn statuses(&self) -> Vec<JobStatus> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    JobEvent::Status { status, .. } => Some(*status),
                    _ => None,
                })
                .collect()
        }
    }

    /// Media that reports a few progress callbacks then succeeds by writing
    /// the file.
    struct SuccessMedia {
        total: u64,
    }

    #[async_trait]
    impl MediaHandle for SuccessMedia {
        async fn download_to(
            &self,
            path: &Path,
            progress: ProgressFn<'_>,
        ) -> Result<(), ChatError> {
            for step in 1..=4_u64 {
                progress(self.total * step / 4, self.total);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::fs::write(path, vec![0_u8; usize::try_from(self.total).unwrap()])
                .await
                .map_err(|e| ChatError::Transfer(e.to_string()))
        }

        async fn post_reply(&self, _text: &str) -> Result<Option<i64>, ChatError> {
            Ok(Some(1))
        }

        async fn edit_reply(&self, _reply_id: i64, _text: &str) -> Result<(), ChatError> {
            Ok(())
        }
    }

    /// Media whose every attempt fails.
    struct FailingMedia;

    #[async_trait]
    impl MediaHandle for FailingMedia {
        async fn download_to(
            &self,
            _path: &Path,
            _progress: ProgressFn<'_>,
        ) -> Result<(), ChatError> {
            Err(ChatError::Transfer("connection reset".into()))
        }

        async fn post_reply(&self, _text: &str) -> Result<Option<i64>, ChatError> {
            // Side-channel refusal must not matter
            Err(ChatError::Session("flood wait".into()))
        }

        async fn edit_reply(&self, _reply_id: i64, _text: &str) -> Result<(), ChatError> {
            Ok(())
        }
    }

    /// Media that never finishes until cancelled.
    struct StallingMedia;

    #[async_trait]
    impl MediaHandle for StallingMedia {
        async fn download_to(
            &self,
            _path: &Path,
            progress: ProgressFn<'_>,
        ) -> Result<(), ChatError> {
            progress(10, 100);
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(())
        }

        async fn post_reply(&self, _text: &str) -> Result<Option<i64>, ChatError> {
            Ok(None)
        }

        async fn edit_reply(&self, _reply_id: i64, _text: &str) -> Result<(), ChatError> {
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<dyn JobStore>,
        events: Arc<CollectingEmitter>,
        registry: Arc<WorkerRegistry>,
        intake: Arc<ChatIntake>,
        _tmp: tempfile::TempDir,
    }

    async fn fixture(config: ChatWorkerConfig) -> Fixture {
        let pool = setup_test_database().await.unwrap();
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::new(pool.clone()));
        let routing = Arc::new(SqliteRoutingStore::new(pool));
        let events = Arc::new(CollectingEmitter::default());
        let registry = Arc::new(WorkerRegistry::new());
        let tmp = tempfile::tempdir().unwrap();
        let intake = Arc::new(ChatIntake::new(
            Arc::clone(&store),
            routing,
            events.clone() as Arc<dyn JobEventEmitter>,
            Arc::clone(&registry),
            tmp.path().to_path_buf(),
            config,
        ));
        Fixture {
            store,
            events,
            registry,
            intake,
            _tmp: tmp,
        }
    }

    fn inbound(message_id: i64, name: &str, mime: &str, media: Arc<dyn MediaHandle>) -> InboundFile {
        InboundFile {
            message_id,
            suggested_name: Some(name.to_string()),
            mime_type: Some(mime.to_string()),
            media,
        }
    }

    async fn wait_for_terminal(store: &Arc<dyn JobStore>, eid: &str) -> JobStatus {
        for _ in 0..400 {
            let job = store.get_by_external_id(eid).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {eid} never reached a terminal status");
    }

    #[tokio::test]
    async fn happy_path_reaches_done_with_final_progress() {
        let fx = fixture(ChatWorkerConfig {
            retry_delay: Duration::from_millis(10),
            ..ChatWorkerConfig::default()
        })
        .await;

        fx.intake
            .handle_inbound(inbound(12345, "movie.mp4", "video/mp4", Arc::new(SuccessMedia { total: 4096 })))
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&fx.store, "12345").await, JobStatus::Done);
        let job = fx.store.get_by_external_id("12345").await.unwrap().unwrap();
        assert!((job.progress - 100.0).abs() < f64::EPSILON);
        assert!((job.speed - 0.0).abs() < f64::EPSILON);
        assert_eq!(job.downloaded_bytes, 4096);
        assert_eq!(job.source_tag, "chat");

        // new precedes status(done); worker gone from the registry
        let events = fx.events.events.lock().unwrap();
        assert!(matches!(events.first(), Some(JobEvent::New { .. })));
        drop(events);
        assert_eq!(fx.events.statuses(), vec![JobStatus::Done]);
        // Give the guard a beat to drop
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn media_kind_routes_to_the_right_folder() {
        let fx = fixture(ChatWorkerConfig {
            retry_delay: Duration::from_millis(5),
            ..ChatWorkerConfig::default()
        })
        .await;

        fx.intake
            .handle_inbound(inbound(5, "pic.png", "image/png", Arc::new(SuccessMedia { total: 16 })))
            .await
            .unwrap();
        wait_for_terminal(&fx.store, "5").await;

        assert!(fx._tmp.path().join("Images").join("pic.png").is_file());
    }

    #[tokio::test]
    async fn retry_exhaustion_marks_failed_with_attempt_errors() {
        let fx = fixture(ChatWorkerConfig {
            max_retries: 3,
            retry_delay: Duration::from_millis(5),
            ..ChatWorkerConfig::default()
        })
        .await;

        fx.intake
            .handle_inbound(inbound(777, "doc.pdf", "application/pdf", Arc::new(FailingMedia)))
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&fx.store, "777").await, JobStatus::Failed);
        let job = fx.store.get_by_external_id("777").await.unwrap().unwrap();
        let error = job.error.unwrap();
        assert!(error.contains("attempt 3/3 failed"), "got: {error}");
        assert!(error.contains("connection reset"));
        // No successful callback: no progress events at all
        let progress_events = fx
            .events
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, JobEvent::Progress { .. }))
            .count();
        assert_eq!(progress_events, 0);
        assert_eq!(fx.events.statuses(), vec![JobStatus::Failed]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_job() {
        let fx = fixture(ChatWorkerConfig::default()).await;

        fx.intake
            .handle_inbound(inbound(42, "big.bin", "application/octet-stream", Arc::new(StallingMedia)))
            .await
            .unwrap();

        // Let the attempt start, then fire the token
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fx.registry.cancel("42"));

        assert_eq!(wait_for_terminal(&fx.store, "42").await, JobStatus::Stopped);
        let job = fx.store.get_by_external_id("42").await.unwrap().unwrap();
        assert!((job.speed - 0.0).abs() < f64::EPSILON);
        assert_eq!(fx.events.statuses(), vec![JobStatus::Stopped]);
    }

    #[tokio::test]
    async fn existing_destination_fails_instead_of_overwriting() {
        let fx = fixture(ChatWorkerConfig::default()).await;

        let docs = fx._tmp.path().join("Documents");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("taken.bin"), b"original").unwrap();

        fx.intake
            .handle_inbound(inbound(9, "taken.bin", "application/octet-stream", Arc::new(SuccessMedia { total: 8 })))
            .await
            .unwrap();

        assert_eq!(wait_for_terminal(&fx.store, "9").await, JobStatus::Failed);
        // The original artifact is untouched
        assert_eq!(std::fs::read(docs.join("taken.bin")).unwrap(), b"original");
    }
}
