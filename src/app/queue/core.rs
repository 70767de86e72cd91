//! Bounded single-producer, multi-consumer task queue
//!
//! The producer pushes every task and then drops its sender, which closes the
//! queue. Consumers share the receiver behind an async mutex and get `None`
//! once the queue is empty and closed, or as soon as the run is cancelled.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::DownloadTask;
use crate::errors::{DownloadError, DownloadResult};

/// Creates a queue holding at most `capacity` pending tasks
pub fn task_queue(capacity: usize) -> (TaskProducer, TaskQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        TaskProducer { tx },
        TaskQueue {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Sending half; dropping it closes the queue
#[derive(Debug)]
pub struct TaskProducer {
    tx: mpsc::Sender<DownloadTask>,
}

impl TaskProducer {
    /// Enqueues one task, waiting for space
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Cancelled` if cancelled while waiting, or
    /// `DownloadError::Other` if every consumer is gone
    pub async fn send(&self, task: DownloadTask, cancel: &CancellationToken) -> DownloadResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            sent = self.tx.send(task) => sent.map_err(|e| {
                DownloadError::Other(format!("task queue closed before {} was queued", e.0.name))
            }),
        }
    }

    /// Enqueues every task in order, then closes the queue
    ///
    /// # Errors
    ///
    /// Returns the first `send` error; the queue is closed either way
    pub async fn fill(
        self,
        tasks: Vec<DownloadTask>,
        cancel: &CancellationToken,
    ) -> DownloadResult<usize> {
        let mut queued = 0;
        for task in tasks {
            self.send(task, cancel).await?;
            queued += 1;
        }
        debug!("Queued {} tasks, closing queue", queued);
        Ok(queued)
    }
}

/// Receiving half shared by every worker
#[derive(Debug, Clone)]
pub struct TaskQueue {
    rx: Arc<Mutex<mpsc::Receiver<DownloadTask>>>,
}

impl TaskQueue {
    /// Same as [`task_queue`]
    pub fn bounded(capacity: usize) -> (TaskProducer, TaskQueue) {
        task_queue(capacity)
    }

    /// Takes the next task
    ///
    /// Returns `None` once the producer is done and the queue is drained, or
    /// when `cancel` fires.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<DownloadTask> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            task = async {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            } => task,
        }
    }
}
