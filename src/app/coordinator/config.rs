//! Configuration structures for the download coordinator

use std::path::PathBuf;

use crate::app::fetcher::FetchOptions;
use crate::app::worker::WorkerConfig;
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for one download run
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Per-file options handed to the fetcher
    pub fetch: FetchOptions,
    /// Parallelism and retry policy
    pub worker: WorkerConfig,
    /// Randomise the link order before queueing
    pub shuffle: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            worker: WorkerConfig::default(),
            shuffle: true,
        }
    }
}

impl CoordinatorConfig {
    /// Set the output directory
    pub fn with_out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.fetch.out_dir = out_dir.into();
        self
    }

    /// Set the worker configuration
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Keep links in the order given
    pub fn without_shuffle(mut self) -> Self {
        self.shuffle = false;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> DownloadResult<()> {
        self.worker.validate()?;
        if self.fetch.out_dir.as_os_str().is_empty() {
            return Err(DownloadError::ConfigurationError(
                "Output directory cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
