//! The URL download worker: supervises one extractor subprocess.
//!
//! Stdout and stderr are merged into one line stream (byte-based reads with
//! lossy decoding, so a stray non-UTF8 byte cannot kill the reader). Each
//! line is classified as progress, a destination announcement, an
//! already-downloaded notice, or noise. Cancellation escalates
//! SIGTERM → 5 s grace → SIGKILL.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use grabbit_core::{JobEvent, JobEventEmitter, JobStatus, JobStore, ProgressPatch, ProgressPayload};

use crate::emit_stats;
use crate::progress::ProgressTracker;

use super::parse::{LineEvent, classify_line};

/// Grace period between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

pub(crate) struct UrlWorker {
    pub store: Arc<dyn JobStore>,
    pub events: Arc<dyn JobEventEmitter>,
    pub external_id: String,
    pub cancel: CancellationToken,
}

impl UrlWorker {
    /// Supervise the subprocess to completion.
    pub async fn supervise(self, mut child: Child) {
        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut tracker = ProgressTracker::new();
        let mut last_line: Option<String> = None;
        let mut last_total: u64 = 0;

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::info!(external_id = %self.external_id, "cancelling extractor subprocess");
                    if let Err(e) = shutdown_child(&mut child).await {
                        tracing::warn!(error = %e, "subprocess shutdown failed");
                    }
                    self.store_stopped().await;
                    return;
                }

                line = line_rx.recv() => {
                    let Some(line) = line else { break };
                    if line.is_empty() {
                        continue;
                    }
                    tracing::debug!(external_id = %self.external_id, "extractor: {line}");
                    last_line = Some(line.clone());

                    match classify_line(&line) {
                        LineEvent::Progress(patch) => {
                            last_total = patch.total_bytes;
                            // Completion owns the 100% write (invariant:
                            // progress 100 only ever appears with status done)
                            if patch.progress >= 100.0 {
                                continue;
                            }
                            self.record_progress(&mut tracker, patch).await;
                        }
                        LineEvent::Destination(basename) => {
                            tracing::info!(external_id = %self.external_id, file = %basename, "destination reported");
                            if let Err(e) = self.store.set_file(&self.external_id, &basename).await {
                                tracing::warn!(error = %e, "filename write failed");
                            }
                        }
                        LineEvent::AlreadyDownloaded => {
                            tracing::info!(external_id = %self.external_id, "artifact already on disk");
                            self.store_done(last_total).await;
                            // Reap in the background; nothing left to read
                            tokio::spawn(async move {
                                let _ = child.wait().await;
                            });
                            return;
                        }
                        LineEvent::Noise => {}
                    }
                }
            }
        }

        // Both streams hit EOF; collect the exit status
        let status = child.wait().await;
        self.finish(status, last_total, last_line).await;
    }

    async fn record_progress(&self, tracker: &mut ProgressTracker, patch: ProgressPatch) {
        if let Err(e) = self.store.update_progress(&self.external_id, patch).await {
            tracing::warn!(error = %e, "progress write failed, continuing in memory");
        }
        if tracker.should_emit() {
            self.events.emit(JobEvent::Progress {
                progress: ProgressPayload {
                    external_id: self.external_id.clone(),
                    progress: patch.progress,
                    downloaded_bytes: patch.downloaded_bytes,
                    total_bytes: patch.total_bytes,
                    speed: patch.speed,
                    pending_time: patch.pending_time,
                },
            });
        }
    }

    /// Interpret the exit status once the output streams are drained.
    async fn finish(self, status: io::Result<ExitStatus>, last_total: u64, last_line: Option<String>) {
        match status {
            Ok(status) if status.success() => {
                self.store_done(last_total).await;
            }
            Ok(status) => {
                if killed_by_signal(&status) {
                    // The operator's stop path owns the terminal state; an
                    // external kill did not originate with the operator.
                    if self.cancel.is_cancelled() {
                        return;
                    }
                    self.store_failed_unless_settled("terminated by signal").await;
                    return;
                }
                let error = last_line.unwrap_or_else(|| "download failed".to_string());
                self.store_failed_unless_settled(&error).await;
            }
            Err(e) => {
                self.store_failed_unless_settled(&format!("extractor wait failed: {e}")).await;
            }
        }
    }

    async fn store_done(&self, last_total: u64) {
        let total = (last_total > 0).then_some(last_total);
        match self.store.mark_done(&self.external_id, total).await {
            // Row soft-deleted underneath us: deleted was this job's last event
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => tracing::warn!(error = %e, "terminal write failed"),
        }
        self.events.emit(JobEvent::Progress {
            progress: ProgressPayload {
                external_id: self.external_id.clone(),
                progress: 100.0,
                downloaded_bytes: last_total,
                total_bytes: last_total,
                speed: 0.0,
                pending_time: Some(0.0),
            },
        });
        self.events.emit(JobEvent::status(&self.external_id, JobStatus::Done));
        emit_stats(&self.store, &self.events).await;
        tracing::info!(external_id = %self.external_id, "url download complete");
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
        tracing::info!(external_id = %self.external_id, "url download stopped");
    }

    /// Mark failed unless the stored status already settled as stopped or
    /// done (a concurrent stop or an already-downloaded exit beat us).
    async fn store_failed_unless_settled(&self, error: &str) {
        match self.store.get_by_external_id(&self.external_id).await {
            Ok(Some(job)) if matches!(job.status, JobStatus::Stopped | JobStatus::Done) => {
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "status read failed before failure write");
            }
        }
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
        tracing::warn!(external_id = %self.external_id, error, "url download failed");
    }
}

/// Whether the process died to a signal (never the case on Windows).
fn killed_by_signal(status: &ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().is_some()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        false
    }
}

/// Gracefully shut down the subprocess: SIGTERM, wait up to five seconds,
/// then SIGKILL, then reap.
async fn shutdown_child(child: &mut Child) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let Some(pid) = child.id() else {
            // Already reaped
            return child.wait().await;
        };

        #[allow(clippy::cast_possible_wrap)]
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            if e == nix::errno::Errno::ESRCH {
                return child.wait().await;
            }
            return Err(io::Error::other(e));
        }

        if let Ok(result) = tokio::time::timeout(TERM_GRACE, child.wait()).await {
            return result;
        }

        // Grace elapsed, escalate
        child.kill().await?;
        child.wait().await
    }

    #[cfg(not(unix))]
    {
        child.kill().await?;
        child.wait().await
    }
}

/// Byte-based line reader; lossy UTF-8 so binary noise cannot end the task.
fn spawn_line_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    tx: mpsc::UnboundedSender<String>,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf).trim().to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "line reader exiting on read error");
                    break;
                }
            }
        }
    });
}
