//! Core download worker implementation
//!
//! A [`DownloadWorker`] pulls tasks from the shared queue until it is closed
//! and drained. Each task gets up to `retries` fetch attempts with a fixed,
//! cancellable delay between them. A task that fails for good is logged,
//! recorded and left behind; the worker carries on with the next one.
//! Authentication failures are the exception: the worker cancels the run's
//! token so the producer and its siblings stop too.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use super::stats::DownloadStats;
use super::types::{EventSink, FailedTask, TaskEvent, WorkerResult};
use crate::app::fetcher::{remove_if_exists, FetchOutcome, ZoneFetcher};
use crate::app::queue::{DownloadTask, TaskQueue};
use crate::errors::{DownloadError, DownloadResult};

/// Individual download worker
#[derive(Debug)]
pub struct DownloadWorker {
    id: u32,
    config: WorkerConfig,
    queue: TaskQueue,
    fetcher: ZoneFetcher,
    stats: Arc<DownloadStats>,
    events: EventSink,
}

impl DownloadWorker {
    pub fn new(
        id: u32,
        config: WorkerConfig,
        queue: TaskQueue,
        fetcher: ZoneFetcher,
        stats: Arc<DownloadStats>,
        events: EventSink,
    ) -> Self {
        Self {
            id,
            config,
            queue,
            fetcher,
            stats,
            events,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Processes tasks until the queue is drained
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Cancelled` when the run is cancelled, or the
    /// authentication error that aborted it. Other task failures are recorded
    /// in the shared stats, never returned.
    pub async fn run(self, cancel: CancellationToken) -> WorkerResult<()> {
        debug!("Worker {} starting", self.id);

        while let Some(mut task) = self.queue.next(&cancel).await {
            self.events.send(TaskEvent::Started {
                worker_id: self.id,
                name: task.name.clone(),
            });

            self.stats.task_started();
            let result = self.fetch_with_retry(&cancel, &mut task).await;
            self.stats.task_finished();

            match result {
                Ok(FetchOutcome::Downloaded { bytes, elapsed }) => {
                    self.stats.record_downloaded(bytes);
                    self.events.send(TaskEvent::Downloaded {
                        name: task.name,
                        bytes,
                        elapsed,
                    });
                }
                Ok(FetchOutcome::Skipped) => {
                    info!("Skipped {}, local copy is current", task.name);
                    self.stats.record_skipped();
                    self.events.send(TaskEvent::Skipped { name: task.name });
                }
                Err(e) if e.is_cancelled() => {
                    discard_partial(&task).await;
                    debug!("Worker {} cancelled during {}", self.id, task.name);
                    return Err(DownloadError::Cancelled);
                }
                Err(e) if e.is_systemic() => {
                    discard_partial(&task).await;
                    error!("Worker {} aborting run at {}: {}", self.id, task.name, e);
                    cancel.cancel();
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "Failed to download {} from {} after {} attempt(s): {}",
                        task.name, task.url, task.attempts, e
                    );
                    discard_partial(&task).await;
                    let failed = FailedTask {
                        name: task.name,
                        url: task.url,
                        error: e.to_string(),
                    };
                    self.stats.record_failed(failed.clone());
                    self.events.send(TaskEvent::Failed(failed));
                }
            }
        }

        if cancel.is_cancelled() {
            debug!("Worker {} stopped by cancellation", self.id);
            return Err(DownloadError::Cancelled);
        }

        debug!("Worker {} finished, queue drained", self.id);
        Ok(())
    }

    /// Runs fetch attempts until one succeeds or the task is out of attempts
    async fn fetch_with_retry(
        &self,
        cancel: &CancellationToken,
        task: &mut DownloadTask,
    ) -> DownloadResult<FetchOutcome> {
        loop {
            task.attempts += 1;
            let attempt = task.attempts;

            let err = match self.fetcher.fetch(cancel, task).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };

            if err.is_cancelled() || !err.is_task_retryable() || attempt >= self.config.retries {
                return Err(err);
            }

            warn!(
                "Attempt {}/{} for {} failed: {}. Retrying in {}s",
                attempt,
                self.config.retries,
                task.name,
                err,
                self.config.retry_delay.as_secs()
            );
            self.events.send(TaskEvent::Retrying {
                name: task.name.clone(),
                attempt,
                error: err.to_string(),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }
}

/// Removes the temp sibling of a task that did not complete
///
/// The destination itself is only ever replaced by rename, so it is left as is.
async fn discard_partial(task: &DownloadTask) {
    if let Some(temp) = task.temp_path() {
        remove_if_exists(&temp).await;
    }
}
