//! Download worker system for concurrent zone transfers
//!
//! A fixed number of workers share one bounded task queue. Each worker takes
//! the next task, runs the fetcher with a per-task retry budget and moves on,
//! so one failing zone never holds up the others.
//!
//! # Module Organization
//!
//! - [`config`] - Parallelism and retry policy with validation
//! - [`types`] - Task events and failure records
//! - [`stats`] - Counters shared by every worker of a run
//! - [`core`] - Individual worker loop with retry handling
//! - [`pool`] - Spawning and joining the workers
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use czds_fetcher::app::client::{ClientConfig, Credentials, CzdsClient};
//! use czds_fetcher::app::fetcher::{FetchOptions, ZoneFetcher};
//! use czds_fetcher::app::queue::{task_queue, DownloadTask};
//! use czds_fetcher::app::worker::{DownloadStats, EventSink, WorkerConfig, WorkerPool};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(CzdsClient::new(
//!     ClientConfig::default(),
//!     Credentials::new("user", "secret"),
//! )?);
//! let fetcher = ZoneFetcher::new(client, FetchOptions::default());
//! let config = WorkerConfig::default().with_parallel(4);
//! let (producer, queue) = task_queue(config.queue_capacity());
//! let stats = Arc::new(DownloadStats::new());
//! let cancel = CancellationToken::new();
//!
//! let pool = WorkerPool::new(config, queue, fetcher, stats.clone(), EventSink::disabled());
//! let tasks = vec![DownloadTask::new("https://czds-api.icann.org/czds/downloads/com.zone")];
//!
//! let (filled, finished) = tokio::join!(producer.fill(tasks, &cancel), pool.run(cancel.clone()));
//! filled?;
//! finished?;
//! println!("{} downloaded", stats.snapshot().downloaded);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod pool;
pub mod stats;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::WorkerConfig;
pub use core::DownloadWorker;
pub use pool::WorkerPool;
pub use stats::{DownloadStats, StatsSnapshot};
pub use types::{EventSink, FailedTask, TaskEvent, WorkerResult};
