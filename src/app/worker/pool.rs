//! Worker pool management
//!
//! The pool spawns one tokio task per worker, all sharing one queue, one
//! fetcher, one stats block and one event sink, then waits for every one of
//! them. Once all have stopped, the first error that is not a cancellation is
//! returned, falling back to the cancellation itself.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::WorkerConfig;
use super::core::DownloadWorker;
use super::stats::DownloadStats;
use super::types::{EventSink, WorkerResult};
use crate::app::fetcher::ZoneFetcher;
use crate::app::queue::TaskQueue;
use crate::errors::DownloadError;

/// Pool of download workers
#[derive(Debug)]
pub struct WorkerPool {
    config: WorkerConfig,
    queue: TaskQueue,
    fetcher: ZoneFetcher,
    stats: Arc<DownloadStats>,
    events: EventSink,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        queue: TaskQueue,
        fetcher: ZoneFetcher,
        stats: Arc<DownloadStats>,
        events: EventSink,
    ) -> Self {
        Self {
            config,
            queue,
            fetcher,
            stats,
            events,
        }
    }

    /// Runs `parallel` workers to completion
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::ConfigurationError` for an invalid
    /// configuration, otherwise the first non-cancellation error any worker
    /// returned, or `DownloadError::Cancelled` on cancellation
    pub async fn run(self, cancel: CancellationToken) -> WorkerResult<()> {
        self.config.validate()?;
        info!("Starting {} workers", self.config.parallel);

        let handles: Vec<JoinHandle<WorkerResult<()>>> = (0..self.config.parallel)
            .map(|id| {
                let worker = DownloadWorker::new(
                    id as u32,
                    self.config.clone(),
                    self.queue.clone(),
                    self.fetcher.clone(),
                    self.stats.clone(),
                    self.events.clone(),
                );
                tokio::spawn(worker.run(cancel.clone()))
            })
            .collect();

        // Workers hold their own clones; ours must not keep the queue open
        drop(self.queue);

        let mut first_error: Option<DownloadError> = None;
        for (id, handle) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Worker {} panicked: {}", id, e);
                    Err(DownloadError::Other(format!("worker {} panicked: {}", id, e)))
                }
            };

            if let Err(e) = result {
                debug!("Worker {} stopped with error: {}", id, e);
                let replace = match &first_error {
                    None => true,
                    Some(held) => held.is_cancelled() && !e.is_cancelled(),
                };
                if replace {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("All {} workers finished", self.config.parallel);
                Ok(())
            }
        }
    }
}
