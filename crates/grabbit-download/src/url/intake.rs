//! URL intake: probe, start, and resume operations.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use grabbit_core::routing::{self, MediaKind};
use grabbit_core::sanitize::url_job_filename;
use grabbit_core::{
    Job, JobEvent, JobEventEmitter, JobKind, JobStore, NewJob, RoutingStore,
};

use crate::emit_stats;
use crate::registry::WorkerRegistry;

use super::extractor::{ExtractError, Extractor, ProbeInfo, SpawnSpec};
use super::worker::UrlWorker;

/// Operator request to start a URL download.
#[derive(Clone, Debug, Default)]
pub struct StartRequest {
    pub url: String,
    pub format_id: Option<String>,
    pub title: Option<String>,
    pub ext: Option<String>,
    pub filesize: Option<u64>,
    pub resolution: Option<String>,
}

/// Creates URL jobs and launches their workers.
pub struct UrlIntake {
    store: Arc<dyn JobStore>,
    routing: Arc<dyn RoutingStore>,
    events: Arc<dyn JobEventEmitter>,
    registry: Arc<WorkerRegistry>,
    extractor: Arc<dyn Extractor>,
    download_dir: PathBuf,
    cookies_file: Option<PathBuf>,
}

impl UrlIntake {
    pub fn new(
        store: Arc<dyn JobStore>,
        routing: Arc<dyn RoutingStore>,
        events: Arc<dyn JobEventEmitter>,
        registry: Arc<WorkerRegistry>,
        extractor: Arc<dyn Extractor>,
        download_dir: PathBuf,
        cookies_file: Option<PathBuf>,
    ) -> Self {
        Self {
            store,
            routing,
            events,
            registry,
            extractor,
            download_dir,
            cookies_file,
        }
    }

    /// Probe a URL for metadata and downloadable formats.
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo, ExtractError> {
        self.extractor.probe(url).await
    }

    /// Create a job for the URL and launch its worker.
    pub async fn start(&self, request: StartRequest) -> Result<Job, ExtractError> {
        let source_tag = routing::source_tag_from_url(&request.url);
        let route = self.routing.get_by_tag(&source_tag).await.ok().flatten();

        // Probe when the caller gave no title; that probe also feeds the
        // quality preference from the routing entry.
        let (title, ext, filesize, format_id) = if let Some(title) = request.title.clone() {
            (
                title,
                request.ext.clone().unwrap_or_else(|| "mp4".to_string()),
                request.filesize,
                request.format_id.clone(),
            )
        } else {
            let info = self.probe(&request.url).await?;
            let format_id = request.format_id.clone().or_else(|| {
                route.as_ref().and_then(|r| r.quality.as_deref()).map(|preferred| {
                    routing::select_format_id(
                        info.formats
                            .iter()
                            .map(|f| (f.format_id.as_str(), f.height)),
                        Some(preferred),
                    )
                })
            });
            (info.title, info.ext, info.filesize, format_id)
        };

        let external_id = Uuid::new_v4().to_string();
        let file = url_job_filename(&title, request.resolution.as_deref(), &ext);

        let job = self
            .store
            .insert(NewJob {
                external_id: external_id.clone(),
                source_tag,
                url: Some(request.url.clone()),
                file,
                total_bytes: filesize.unwrap_or(0),
            })
            .await
            .map_err(ExtractError::Storage)?;

        tracing::info!(
            external_id = %external_id,
            url = %request.url,
            format = format_id.as_deref().unwrap_or("best"),
            "url download accepted"
        );
        self.events.emit(JobEvent::New { job: job.clone() });
        emit_stats(&self.store, &self.events).await;

        self.launch(&external_id, &request.url, format_id).await?;
        Ok(job)
    }

    /// Re-launch the worker for an existing job, keeping its `external_id`,
    /// URL and progress: the extractor resumes from the partial artifact on
    /// the same path.
    pub async fn resume(&self, job: &Job) -> Result<(), ExtractError> {
        let url = job
            .url
            .clone()
            .ok_or_else(|| ExtractError::Other("job has no URL".to_string()))?;
        self.launch(&job.external_id, &url, None).await
    }

    async fn launch(
        &self,
        external_id: &str,
        url: &str,
        format_id: Option<String>,
    ) -> Result<(), ExtractError> {
        // Destination is re-resolved at every (re)start so a recovered mount
        // is picked up and a lost one degrades to the default folder
        let source_tag = routing::source_tag_from_url(url);
        let route = self.routing.get_by_tag(&source_tag).await.ok().flatten();
        let output_dir =
            routing::resolve_destination(route.as_ref(), MediaKind::Videos, &self.download_dir);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| ExtractError::Other(format!("cannot create {}: {e}", output_dir.display())))?;

        let cancel = CancellationToken::new();
        let Some(guard) = self
            .registry
            .register(external_id, JobKind::Url, cancel.clone())
        else {
            return Err(ExtractError::Other("download is already running".to_string()));
        };

        let spec = SpawnSpec {
            url: url.to_string(),
            output_dir,
            format_id,
            cookies_file: self.cookies_file.clone(),
        };

        let child = match self.extractor.spawn(&spec) {
            Ok(child) => child,
            Err(e) => {
                drop(guard);
                let error = format!("failed to start extractor: {e}");
                if let Err(e) = self.store.mark_failed(external_id, &error).await {
                    tracing::warn!(error = %e, "terminal write failed");
                }
                self.events.emit(JobEvent::status_with_error(
                    external_id,
                    grabbit_core::JobStatus::Failed,
                    &error,
                ));
                return Err(ExtractError::Other(error));
            }
        };

        let worker = UrlWorker {
            store: Arc::clone(&self.store),
            events: Arc::clone(&self.events),
            external_id: external_id.to_string(),
            cancel,
        };
        tokio::spawn(async move {
            let _guard = guard;
            worker.supervise(child).await;
        });

        Ok(())
    }
}
