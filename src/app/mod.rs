//! Core application logic for CZDS Fetcher
//!
//! This module contains the CZDS API client, the paginated request lister and
//! the download engine built from the task queue, the single-file fetcher,
//! the worker pool and the coordinator that ties them together.

pub mod client;
pub mod coordinator;
pub mod fetcher;
pub mod lister;
pub mod queue;
pub mod worker;

// Re-export main public API
pub use client::{ClientConfig, Credentials, CzdsClient, DownloadInfo};
pub use coordinator::{select_links, Coordinator, CoordinatorConfig, SessionResult, SignalHandler};
pub use fetcher::{FetchOptions, FetchOutcome, ZoneFetcher};
pub use lister::{ListResult, Lister, PageSource};
pub use queue::{task_queue, DownloadTask, TaskProducer, TaskQueue};
pub use worker::{DownloadStats, FailedTask, TaskEvent, WorkerConfig, WorkerPool};
