//! Bounded-concurrency segment fetching with fixed-delay retries and the muted-audio fallback.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::client::Transport;
use crate::config::SegmentRetryConfig;
use crate::error::{Result, TransportError, VodError};
use crate::playlist::Segment;
use crate::progress::{PercentTracker, Phase, ProgressSink};

/// Fetches a list of segments into a directory using a fixed-size worker pool.
pub struct SegmentDownloader {
    transport: Arc<dyn Transport>,
    retry: SegmentRetryConfig,
    concurrency: usize,
}

/// Where and how one batch of segments is downloaded.
#[derive(Debug, Clone)]
pub struct DownloadRequest<'a> {
    pub segments: &'a [Segment],
    pub base_url: &'a Url,
    pub directory: &'a Path,
    /// Request the original audio for muted segments until the platform refuses.
    pub attempt_unmute: bool,
}

struct WorkerContext {
    transport: Arc<dyn Transport>,
    retry: SegmentRetryConfig,
    base_url: Url,
    directory: PathBuf,
    queue: Mutex<VecDeque<Segment>>,
    unmute: AtomicBool,
    tracker: PercentTracker,
    token: CancellationToken,
}

impl SegmentDownloader {
    pub fn new(transport: Arc<dyn Transport>, retry: SegmentRetryConfig, concurrency: usize) -> Self {
        Self {
            transport,
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// Download every segment of `request` into its directory.
    ///
    /// Completion order across workers is arbitrary. The first segment that exhausts its
    /// attempts stops the other workers and is returned once they have all exited, so no
    /// task is still writing when this returns.
    pub async fn download_all(
        &self,
        request: DownloadRequest<'_>,
        progress: &ProgressSink,
        token: &CancellationToken,
    ) -> Result<()> {
        let total = request.segments.len();
        if total == 0 {
            return Ok(());
        }

        let workers = self.concurrency.min(total);
        info!(
            segments = total,
            workers,
            unmute = request.attempt_unmute,
            "Downloading segments"
        );

        let context = Arc::new(WorkerContext {
            transport: self.transport.clone(),
            retry: self.retry.clone(),
            base_url: request.base_url.clone(),
            directory: request.directory.to_path_buf(),
            queue: Mutex::new(request.segments.iter().cloned().collect()),
            unmute: AtomicBool::new(request.attempt_unmute),
            tracker: PercentTracker::new(Phase::Downloading, total, progress.clone()),
            token: token.child_token(),
        });

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let context = context.clone();
            set.spawn(async move { context.run_worker(worker_id).await });
        }

        let mut first_error: Option<VodError> = None;
        while let Some(joined) = set.join_next().await {
            let outcome = joined
                .map_err(|e| VodError::internal(format!("download worker failed: {e}")))
                .and_then(|result| result);
            if let Err(e) = outcome
                && first_error.is_none()
            {
                if !e.is_cancelled() {
                    warn!(error = %e, "Segment download failed, stopping remaining workers");
                }
                context.token.cancel();
                first_error = Some(e);
            }
        }

        if token.is_cancelled() {
            return Err(VodError::Cancelled);
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(completed = context.tracker.completed(), "All segments downloaded");
        Ok(())
    }
}

impl WorkerContext {
    async fn run_worker(&self, worker_id: usize) -> Result<()> {
        loop {
            if self.token.is_cancelled() {
                return Err(VodError::Cancelled);
            }
            let Some(segment) = self.queue.lock().pop_front() else {
                trace!(worker_id, "Queue drained, worker exiting");
                return Ok(());
            };
            self.fetch_segment(&segment).await?;
            self.tracker.complete_one();
        }
    }

    async fn fetch_segment(&self, segment: &Segment) -> Result<()> {
        let path = self.directory.join(segment.file_name());
        let mut failures = 0u32;

        loop {
            if self.token.is_cancelled() {
                return Err(VodError::Cancelled);
            }

            let uri = if segment.muted && self.unmute.load(Ordering::Acquire) {
                segment.unmuted_uri()
            } else {
                segment.uri.clone()
            };
            let url = self
                .base_url
                .join(&uri)
                .map_err(|e| VodError::invalid_url(&uri, e.to_string()))?;

            let result = tokio::select! {
                _ = self.token.cancelled() => return Err(VodError::Cancelled),
                result = self.transport.get(&url) => result,
            };

            let error = match result {
                Ok(body) => {
                    tokio::fs::write(&path, &body).await?;
                    trace!(uri = %uri, bytes = body.len(), "Segment saved");
                    return Ok(());
                }
                Err(e) => e,
            };

            failures += 1;
            if failures >= self.retry.max_attempts {
                return Err(VodError::SegmentFetchExhausted {
                    uri: segment.uri.clone(),
                    attempts: failures,
                    last_error: error.to_string(),
                });
            }

            if error.is_forbidden() {
                self.disable_unmute(&error);
                continue;
            }

            warn!(
                uri = %uri,
                attempt = failures,
                max = self.retry.max_attempts,
                delay_ms = self.retry.delay.as_millis() as u64,
                error = %error,
                "Segment fetch failed, retrying"
            );
            tokio::select! {
                _ = self.token.cancelled() => return Err(VodError::Cancelled),
                _ = tokio::time::sleep(self.retry.delay) => {}
            }
        }
    }

    /// Stop requesting unmuted audio for the rest of the job. Logged once.
    fn disable_unmute(&self, error: &TransportError) {
        if self.unmute.swap(false, Ordering::AcqRel) {
            warn!(error = %error, "Unmuted audio refused, using muted segments for the rest of the download");
        }
    }
}
