//! Worker type definitions
//!
//! Events emitted while tasks move through the pool, and the record kept for
//! every task that failed permanently.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::DownloadResult;

/// Result type for worker operations
pub type WorkerResult<T> = DownloadResult<T>;

/// Progress event for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A worker dequeued the task
    Started { worker_id: u32, name: String },
    /// An attempt failed and another will follow after the retry delay
    Retrying {
        name: String,
        attempt: u32,
        error: String,
    },
    /// The file was written to its destination
    Downloaded {
        name: String,
        bytes: u64,
        elapsed: Duration,
    },
    /// The local copy was kept
    Skipped { name: String },
    /// Every attempt failed or the error was not retryable
    Failed(FailedTask),
}

impl TaskEvent {
    /// Name of the task the event is about
    pub fn name(&self) -> &str {
        match self {
            TaskEvent::Started { name, .. }
            | TaskEvent::Retrying { name, .. }
            | TaskEvent::Downloaded { name, .. }
            | TaskEvent::Skipped { name } => name,
            TaskEvent::Failed(failed) => &failed.name,
        }
    }

    /// Whether the task is finished after this event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::Downloaded { .. } | TaskEvent::Skipped { .. } | TaskEvent::Failed(_)
        )
    }
}

/// A task that ran out of attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTask {
    pub name: String,
    pub url: String,
    pub error: String,
}

/// Optional event sink shared by every worker
///
/// Sending never blocks. A dropped receiver only disables reporting.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<TaskEvent>>,
}

impl EventSink {
    /// Sink that forwards to `tx`
    pub fn new(tx: mpsc::UnboundedSender<TaskEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn send(&self, event: TaskEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                debug!("Task event receiver closed");
            }
        }
    }
}
