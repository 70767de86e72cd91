//! Worker configuration management
//!
//! Parallelism and the per-task retry policy. Values come from the config file
//! and CLI flags and are validated before any worker is spawned.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::workers;
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for the download worker pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub parallel: usize,
    /// Fetch attempts per zone file, including the first
    pub retries: u32,
    /// Fixed delay between attempts of the same zone file
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            parallel: workers::DEFAULT_PARALLEL,
            retries: workers::DEFAULT_RETRIES,
            retry_delay: workers::RETRY_DELAY,
        }
    }
}

impl WorkerConfig {
    /// Set the number of workers
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the attempt count and the delay between attempts
    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Queue capacity for this many workers
    pub fn queue_capacity(&self) -> usize {
        self.parallel.max(1) * workers::QUEUE_SLOTS_PER_WORKER
    }

    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> DownloadResult<()> {
        if self.parallel == 0 {
            return Err(DownloadError::ConfigurationError(
                "Parallel downloads cannot be zero".to_string(),
            ));
        }

        if self.parallel > workers::MAX_PARALLEL {
            return Err(DownloadError::ConfigurationError(format!(
                "Parallel downloads ({}) exceeds maximum ({})",
                self.parallel,
                workers::MAX_PARALLEL
            )));
        }

        if self.retries == 0 {
            return Err(DownloadError::ConfigurationError(
                "Retries must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
